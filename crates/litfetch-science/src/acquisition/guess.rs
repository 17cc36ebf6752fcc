use std::collections::HashMap;

use litfetch_core::FulltextConfig;

use crate::dedup::provider_key;
use crate::identifiers::doi::Doi;

/// Maps an identifier to the backend worth trying first.
#[derive(Debug, Clone)]
pub struct BackendGuesser {
    prefixes: HashMap<String, String>,
    default_backend: String,
    forced: Option<String>,
}

impl BackendGuesser {
    pub fn new(prefixes: HashMap<String, String>, default_backend: &str) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|(prefix, backend)| (prefix.trim().to_lowercase(), provider_key(&backend)))
                .collect(),
            default_backend: provider_key(default_backend),
            forced: None,
        }
    }

    pub fn from_config(config: &FulltextConfig) -> Self {
        Self::new(config.prefix_backends.clone(), &config.default_backend)
    }

    /// Use `backend` as the initial guess for every identifier.
    pub fn force(mut self, backend: Option<&str>) -> Self {
        self.forced = backend
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(provider_key);
        self
    }

    /// DOI registrant prefix looked up in the prefix map, else the default.
    pub fn guess(&self, identifier: &str) -> String {
        if let Some(forced) = &self.forced {
            return forced.clone();
        }
        Doi::parse(identifier)
            .ok()
            .and_then(|doi| self.prefixes.get(doi.prefix()).cloned())
            .unwrap_or_else(|| self.default_backend.clone())
    }

    /// Pair every identifier with its initial guess.
    pub fn plan<I, S>(&self, identifiers: I) -> Vec<(String, Option<String>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        identifiers
            .into_iter()
            .map(|id| {
                let id = id.as_ref();
                (id.to_string(), Some(self.guess(id)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prefixes_map_to_publishers() {
        let guesser = BackendGuesser::from_config(&FulltextConfig::default());
        assert_eq!(guesser.guess("10.1016/j.cell.2020.01.001"), "elsevier");
        assert_eq!(guesser.guess("https://doi.org/10.1021/jacs.0c00001"), "acs");
        assert_eq!(guesser.guess("10.1039/C9CS00001A"), "rsc");
        assert_eq!(guesser.guess("10.1002/anie.202000001"), "wiley");
        assert_eq!(guesser.guess("10.1007/s10562-020-03000-1"), "springer");
    }

    #[test]
    fn unknown_prefix_uses_default() {
        let guesser = BackendGuesser::from_config(&FulltextConfig::default());
        assert_eq!(guesser.guess("10.9999/whatever"), "elsevier");
        assert_eq!(guesser.guess("not-a-doi"), "elsevier");
    }

    #[test]
    fn forced_backend_wins() {
        let guesser = BackendGuesser::from_config(&FulltextConfig::default()).force(Some(" Springer "));
        assert_eq!(guesser.guess("10.1016/j.x"), "springer");

        let plan = guesser.plan(["10.1/a", "10.1/b"]);
        assert_eq!(plan[1], ("10.1/b".to_string(), Some("springer".to_string())));
    }
}
