use chrono::Utc;

// builds "k=v&k=v" with every value encoded
pub fn build_query(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

// millisecond timestamp appended as "_=" so neither the relay nor upstream serve a cached copy
pub fn cache_buster() -> String {
    Utc::now().timestamp_millis().to_string()
}

// trims and upper-cases an icao code
pub fn normalize_site(site: &str) -> String {
    site.trim().to_uppercase()
}

pub fn is_valid_icao(site: &str) -> bool {
    site.len() == 4 && site.chars().all(|c| c.is_ascii_alphanumeric())
}

// drops blanks and duplicates, keeps first-seen order
pub fn dedupe_sites<I, S>(sites: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut unique: Vec<String> = Vec::new();
    for site in sites {
        let site = normalize_site(site.as_ref());
        if !site.is_empty() && !unique.contains(&site) {
            unique.push(site);
        }
    }
    unique
}

// removes one layer of parentheses wrapping the whole block, as NOTAMs arrive "(A1234/24 ...)"
pub fn strip_parens(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('(') && trimmed.ends_with(')') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

// converts wind direction in degrees to a cardinal direction like N, NE, E, etc.
pub fn degrees_to_cardinal(degrees: u32) -> &'static str {
    match degrees {
        0..=22 | 338..=360 => "N",
        23..=67 => "NE",
        68..=112 => "E",
        113..=157 => "SE",
        158..=202 => "S",
        203..=247 => "SW",
        248..=292 => "W",
        293..=337 => "NW",
        _ => "",
    }
}

// turns an upper-wind direction/speed pair into readable text, 990 is the light-and-variable code
pub fn describe_wind(dir: Option<u32>, speed: Option<u32>) -> String {
    match (dir, speed) {
        (Some(990), _) | (_, Some(0)) => "Light and variable".to_string(),
        (Some(dir), Some(speed)) => {
            format!("{} degrees ({}) at {} knots", dir, degrees_to_cardinal(dir), speed)
        }
        (None, Some(speed)) => format!("{} knots", speed),
        _ => "Not available".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_encodes_values() {
        assert_eq!(
            build_query(&[("site", "CYYT"), ("image", "GFA/CLDWX"), ("q", "a b")]),
            "site=CYYT&image=GFA%2FCLDWX&q=a%20b"
        );
        assert_eq!(
            build_query(&[("target", "https://plan.navcanada.ca/?site=CYYT&alpha=metar")]),
            "target=https%3A%2F%2Fplan.navcanada.ca%2F%3Fsite%3DCYYT%26alpha%3Dmetar"
        );
    }

    #[test]
    fn test_dedupe_sites_upper_cases_and_keeps_order() {
        let sites = dedupe_sites(["cyyt", " CYQX", "", "CYYT", "cyhz"]);
        assert_eq!(sites, vec!["CYYT", "CYQX", "CYHZ"]);
    }

    #[test]
    fn test_strip_parens_removes_one_layer() {
        assert_eq!(strip_parens("(A1234/24 NOTAMN)"), "A1234/24 NOTAMN");
        assert_eq!(strip_parens("((x))"), "(x)");
        assert_eq!(strip_parens("no parens"), "no parens");
        assert_eq!(strip_parens("("), "(");
    }

    #[test]
    fn test_describe_wind() {
        assert_eq!(describe_wind(Some(270), Some(45)), "270 degrees (W) at 45 knots");
        assert_eq!(describe_wind(Some(990), Some(3)), "Light and variable");
        assert_eq!(describe_wind(None, None), "Not available");
    }

    #[test]
    fn test_is_valid_icao() {
        assert!(is_valid_icao("CYYT"));
        assert!(!is_valid_icao("CYY"));
        assert!(!is_valid_icao("CY-T"));
    }
}
