//! Title extraction from file and directory names
//!
//! Rules applied in order:
//! 1. cut at a season/episode marker (`S01E02`, `1x02`)
//! 2. take the last release year preceded by a separator and cut before it
//! 3. drop bracketed groups (`[...]`, `(...)`, `{...}`)
//! 4. cut at the first resolution, codec, source or language tag
//! 5. collapse `.`, `_` and whitespace runs into single spaces, trim dashes
//!
//! When nothing is left the enclosing directory name goes through the same
//! rules. For episodes a `Season N` directory is skipped in favour of the
//! show directory above it.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static SEASON_EPISODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s._\-\[(])s(\d{1,2})[\s._\-]?e(\d{1,3})").unwrap()
});

static CROSS_EPISODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[\s._\-\[(])(\d{1,2})x(\d{2,3})\b").unwrap());

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s._\-\[(])(19\d{2}|20[0-3]\d)\b").unwrap());

static BRACKET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").unwrap());

static RELEASE_TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s._\-])(?:2160p|1080p|1080i|720p|576p|480p|4k|uhd|x264|x265|h\.?264|h\.?265|hevc|avc|xvid|divx|10bit|hdr10?|dv|bluray|blu-ray|bdrip|brrip|dvdrip|dvd|webrip|web-dl|webdl|hdtv|hdrip|dvdscr|remux|aac|ac3|dts|ddp?5\.1|atmos)(?:$|[\s._\-\]])",
    )
    .unwrap()
});

static LANGUAGE_TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[\s._\-])(?:MULTI|VOSTFR|TRUEFRENCH|FRENCH|GERMAN|ITALIAN|SPANISH|DUBBED|SUBBED|PROPER|REPACK|EXTENDED|UNRATED|REMASTERED)(?:$|[\s._\-])",
    )
    .unwrap()
});

static SEPARATOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s._]+").unwrap());

static SEASON_DIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:season|series|s)[\s._\-]*\d{1,3}|specials)$").unwrap()
});

/// Title and optional year extracted from a movie file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub title: String,
    pub year: Option<i32>,
}

/// Show title plus episode position extracted from an episode file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEpisode {
    pub show_title: String,
    pub year: Option<i32>,
    pub season_number: i32,
    pub episode_number: i32,
}

/// Extracts a movie title from a file path.
///
/// Returns `None` when neither the file name nor its directory yields a title.
pub fn parse_movie_file(path: &Path) -> Option<ParsedTitle> {
    let stem = path.file_stem()?.to_str()?;
    clean_title(stem).or_else(|| {
        path.parent()
            .and_then(|dir| dir.file_name())
            .and_then(|name| name.to_str())
            .and_then(clean_title)
    })
}

/// Extracts the show title and episode numbers from a file path.
///
/// Returns `None` when the file name carries no episode marker or no show
/// title can be found.
pub fn parse_episode_file(path: &Path) -> Option<ParsedEpisode> {
    let stem = path.file_stem()?.to_str()?;
    let (marker_start, season_number, episode_number) = find_episode_marker(stem)?;

    let parsed = clean_title(&stem[..marker_start]).or_else(|| show_directory_title(path))?;

    Some(ParsedEpisode {
        show_title: parsed.title,
        year: parsed.year,
        season_number,
        episode_number,
    })
}

fn find_episode_marker(text: &str) -> Option<(usize, i32, i32)> {
    let caps = SEASON_EPISODE_PATTERN
        .captures(text)
        .or_else(|| CROSS_EPISODE_PATTERN.captures(text))?;
    let start = caps.get(0)?.start();
    let season = caps.get(1)?.as_str().parse().ok()?;
    let episode = caps.get(2)?.as_str().parse().ok()?;
    Some((start, season, episode))
}

fn show_directory_title(path: &Path) -> Option<ParsedTitle> {
    let mut dirs = path
        .ancestors()
        .skip(1)
        .filter_map(|dir| dir.file_name().and_then(|name| name.to_str()));

    let parent = dirs.next()?;
    if SEASON_DIR_PATTERN.is_match(parent.trim()) {
        dirs.next().and_then(clean_title)
    } else {
        clean_title(parent)
    }
}

fn clean_title(raw: &str) -> Option<ParsedTitle> {
    let mut text = raw.to_string();

    if let Some((start, _, _)) = find_episode_marker(&text) {
        text.truncate(start);
    }

    let found_year = YEAR_PATTERN
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
            (whole.start() > 0).then_some((whole.start(), year))
        })
        .last();
    let year = found_year.map(|(start, year)| {
        text.truncate(start);
        year
    });

    let text = BRACKET_PATTERN.replace_all(&text, " ");
    let cut = [
        RELEASE_TAG_PATTERN.find(&text),
        LANGUAGE_TAG_PATTERN.find(&text),
    ]
    .into_iter()
    .flatten()
    .map(|m| m.start())
    .min()
    .unwrap_or(text.len());

    let collapsed = SEPARATOR_PATTERN.replace_all(&text[..cut], " ");
    let title = collapsed
        .trim_matches(|c: char| c.is_whitespace() || c == '-')
        .to_string();

    if title.is_empty() {
        None
    } else {
        Some(ParsedTitle { title, year })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(path: &str) -> Option<ParsedTitle> {
        parse_movie_file(Path::new(path))
    }

    fn titled(title: &str, year: Option<i32>) -> Option<ParsedTitle> {
        Some(ParsedTitle {
            title: title.to_string(),
            year,
        })
    }

    #[test]
    fn test_dotted_release_name() {
        assert_eq!(
            movie("/movies/Movie.Title.2020.1080p.mkv"),
            titled("Movie Title", Some(2020))
        );
        assert_eq!(
            movie("/movies/The.Matrix.1999.1080p.BluRay.x264-GROUP.mkv"),
            titled("The Matrix", Some(1999))
        );
    }

    #[test]
    fn test_brackets_and_parenthesized_year() {
        assert_eq!(
            movie("/movies/Inception (2010) [1080p].mkv"),
            titled("Inception", Some(2010))
        );
        assert_eq!(
            movie("/movies/[YTS] Arrival 2016 720p.mp4"),
            titled("Arrival", Some(2016))
        );
    }

    #[test]
    fn test_last_year_wins_and_leading_year_is_title() {
        assert_eq!(
            movie("/movies/Blade.Runner.2049.2017.2160p.mkv"),
            titled("Blade Runner 2049", Some(2017))
        );
        assert_eq!(movie("/movies/1917.2019.mkv"), titled("1917", Some(2019)));
        assert_eq!(movie("/movies/1917.mkv"), titled("1917", None));
    }

    #[test]
    fn test_language_and_source_tags() {
        assert_eq!(movie("/movies/Amelie.FRENCH.720p.mkv"), titled("Amelie", None));
        assert_eq!(
            movie("/movies/Some_Film_WEBRip_x265.mkv"),
            titled("Some Film", None)
        );
    }

    #[test]
    fn test_falls_back_to_directory_name() {
        assert_eq!(
            movie("/movies/Heat (1995)/1080p.mkv"),
            titled("Heat", Some(1995))
        );
    }

    #[test]
    fn test_episode_with_show_prefix() {
        let parsed =
            parse_episode_file(Path::new("/tv/Breaking Bad/Season 01/Breaking.Bad.S01E02.720p.mkv"))
                .unwrap();
        assert_eq!(parsed.show_title, "Breaking Bad");
        assert_eq!(parsed.season_number, 1);
        assert_eq!(parsed.episode_number, 2);
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn test_episode_falls_back_past_season_directory() {
        let parsed =
            parse_episode_file(Path::new("/tv/The Office (2005)/Season 2/S02E05.mkv")).unwrap();
        assert_eq!(parsed.show_title, "The Office");
        assert_eq!(parsed.year, Some(2005));
        assert_eq!((parsed.season_number, parsed.episode_number), (2, 5));
    }

    #[test]
    fn test_cross_episode_marker() {
        let parsed = parse_episode_file(Path::new("/tv/Show.Name.3x07.mkv")).unwrap();
        assert_eq!(parsed.show_title, "Show Name");
        assert_eq!((parsed.season_number, parsed.episode_number), (3, 7));
    }

    #[test]
    fn test_no_episode_marker() {
        assert!(parse_episode_file(Path::new("/tv/Some.Movie.2020.1080p.mkv")).is_none());
        assert!(parse_episode_file(Path::new("/tv/Film.1920x1080.mkv")).is_none());
    }
}
