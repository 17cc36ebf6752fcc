use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

const RESOLVER_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
    "DOI:",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Doi {
    pub raw: String,
    pub normalized: String,
}

impl Doi {
    /// Parse a bare DOI or one wrapped in a resolver URL / `doi:` label.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let bare = strip_resolver(input);

        let Some((prefix, suffix)) = bare.split_once('/') else {
            return Err(ScienceError::InvalidDoi(input.to_string()));
        };
        if !prefix.starts_with("10.") || prefix.len() < 4 || suffix.trim().is_empty() {
            return Err(ScienceError::InvalidDoi(input.to_string()));
        }

        Ok(Self {
            raw: input.to_string(),
            normalized: bare.to_lowercase(),
        })
    }

    /// Registrant prefix, e.g. `10.1016` for `10.1016/j.cell.2020.01.001`.
    pub fn prefix(&self) -> &str {
        self.normalized
            .split_once('/')
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.normalized)
    }
}

/// Drop a resolver URL or `doi:` label, keeping the DOI's original case.
pub fn strip_resolver(input: &str) -> &str {
    let input = input.trim();
    RESOLVER_PREFIXES
        .iter()
        .find_map(|p| input.strip_prefix(p))
        .map(str::trim_start)
        .unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resolver_forms_to_same_normalized_value() {
        for input in [
            "10.1016/J.Cell.2020.01.001",
            "https://doi.org/10.1016/j.cell.2020.01.001",
            "http://dx.doi.org/10.1016/j.cell.2020.01.001",
            "doi:10.1016/j.cell.2020.01.001",
            "DOI: 10.1016/j.cell.2020.01.001",
        ] {
            let doi = Doi::parse(input).unwrap();
            assert_eq!(doi.normalized, "10.1016/j.cell.2020.01.001", "{input}");
        }
    }

    #[test]
    fn prefix_is_lowercased_registrant() {
        let doi = Doi::parse("https://doi.org/10.1039/C9CS00001A").unwrap();
        assert_eq!(doi.prefix(), "10.1039");
    }

    #[test]
    fn rejects_malformed_values() {
        for input in ["", "not-a-doi", "10.1000", "10.1000/", "11.1000/x", "10./x"] {
            assert!(Doi::parse(input).is_err(), "{input}");
        }
    }

    #[test]
    fn strip_resolver_keeps_case() {
        assert_eq!(strip_resolver("https://doi.org/10.1/ABC"), "10.1/ABC");
        assert_eq!(strip_resolver(" 10.1/abc "), "10.1/abc");
    }
}
