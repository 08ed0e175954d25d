use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Word boundaries inside a name part: "anne-marie", "o'brien"
static NAME_PART_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\s\-']+").unwrap());

/// English minor words kept lowercase inside a title.
const MINOR_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "nor", "for", "so", "yet", "as", "at", "by", "in",
    "of", "off", "on", "per", "to", "up", "via", "vs",
];

/// Trim and collapse runs of whitespace to single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s.trim(), " ").into_owned()
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Clean a first or last name: collapse whitespace and capitalise each part.
/// Caseless scripts pass through unchanged.
pub fn sanitize_name(s: &str) -> String {
    let collapsed = collapse_whitespace(s);
    NAME_PART_RE
        .replace_all(&collapsed, |caps: &regex::Captures| capitalize_first(&caps[0]))
        .into_owned()
}

/// Login key derived from the sanitised names.
pub fn username(first_name: &str, last_name: &str) -> String {
    format!("{}_{}", first_name, last_name).to_lowercase()
}

/// Title-case a song or show name, keeping minor words lowercase except at the edges.
pub fn title_case(s: &str) -> String {
    let collapsed = collapse_whitespace(s);
    let words: Vec<&str> = collapsed.split(' ').collect();
    let last = words.len().saturating_sub(1);

    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i != 0 && i != last && MINOR_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize_first(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join names for display: "A", "A and B", "A, B and C".
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("lowcase"), "Lowcase");
        assert_eq!(sanitize_name("  lowcase   person "), "Lowcase Person");
        assert_eq!(sanitize_name("anne-marie"), "Anne-Marie");
        assert_eq!(sanitize_name("o'brien"), "O'Brien");
        assert_eq!(sanitize_name("McDonald"), "McDonald");
        // Hebrew has no case
        assert_eq!(sanitize_name("זמר"), "זמר");
        assert_eq!(sanitize_name("   "), "");
    }

    #[test]
    fn test_username() {
        assert_eq!(username("Valid", "Singer"), "valid_singer");
        assert_eq!(username("זמר", "בעברית"), "זמר_בעברית");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("defying gravity"), "Defying Gravity");
        assert_eq!(title_case("brotherhood of man"), "Brotherhood of Man");
        assert_eq!(
            title_case("how to succeed in business without really trying"),
            "How to Succeed in Business Without Really Trying"
        );
        assert_eq!(title_case("the wizard and I"), "The Wizard and I");
        assert_eq!(title_case("what is this feeling of"), "What Is This Feeling Of");
    }

    #[test]
    fn test_join_names() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_names(&[]), "");
        assert_eq!(join_names(&names(&["Alon Aviv"])), "Alon Aviv");
        assert_eq!(
            join_names(&names(&["Alon Aviv", "Shani Wahrman"])),
            "Alon Aviv and Shani Wahrman"
        );
        assert_eq!(
            join_names(&names(&["Alon Aviv", "Shani Wahrman", "Inbal Feldman", "Joey Geralnik"])),
            "Alon Aviv, Shani Wahrman, Inbal Feldman and Joey Geralnik"
        );
    }
}
