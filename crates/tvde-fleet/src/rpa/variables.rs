use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::fleet::{Period, PlatformCredentials};

const MASK: &str = "***";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    #[error("unknown variable '{{{{{0}}}}}'")]
    Unknown(String),
}

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Run context for `{{nome}}` substitution.
///
/// Secret values (passwords, 2FA codes) can be substituted like any other
/// variable but are excluded from [`Variables::public`] and masked by
/// [`Variables::redact`].
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, String>,
    secrets: BTreeSet<String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `username`, `password` and the period bounds (ISO and dd-mm-yyyy).
    pub fn for_run(credentials: Option<&PlatformCredentials>, period: Option<Period>) -> Self {
        let mut variables = Self::new();
        if let Some(credentials) = credentials {
            variables.insert("username", credentials.username.clone());
            variables.insert_secret("password", credentials.password.clone());
        }
        if let Some(period) = period {
            variables.insert("periodo_inicio", period.start.format("%Y-%m-%d").to_string());
            variables.insert("periodo_fim", period.end.format("%Y-%m-%d").to_string());
            variables.insert("periodo_inicio_pt", period.start.format("%d-%m-%Y").to_string());
            variables.insert("periodo_fim_pt", period.end.format("%d-%m-%Y").to_string());
        }
        variables
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.secrets.remove(&name);
        self.values.insert(name, value.into());
    }

    pub fn insert_secret(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.secrets.insert(name.clone());
        self.values.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.secrets.contains(name)
    }

    /// Replaces every placeholder; the first unknown name is an error.
    pub fn substitute(&self, template: &str) -> Result<String, VariableError> {
        let mut missing = None;
        let rendered = placeholder().replace_all(template, |captures: &Captures<'_>| {
            let name = &captures[1];
            match self.values.get(name) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(VariableError::Unknown(name)),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Whether substituting `template` would expose a secret value.
    pub fn references_secret(&self, template: &str) -> bool {
        placeholder()
            .captures_iter(template)
            .any(|captures| self.secrets.contains(&captures[1]))
    }

    /// Masks secret values inside free text such as error messages.
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for name in &self.secrets {
            if let Some(value) = self.values.get(name) {
                if !value.is_empty() {
                    redacted = redacted.replace(value.as_str(), MASK);
                }
            }
        }
        redacted
    }

    /// Non-secret values, safe to persist on the execution record.
    pub fn public(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter(|(name, _)| !self.secrets.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn period() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2024, 3, 4).expect("date"),
            NaiveDate::from_ymd_opt(2024, 3, 10).expect("date"),
        )
        .expect("period")
    }

    #[test]
    fn substitutes_period_and_extracted_values() {
        let mut variables = Variables::for_run(None, Some(period()));
        variables.insert("conta", "PT-991");
        let url = variables
            .substitute("https://x.pt/r?de={{periodo_inicio}}&ate={{ periodo_fim }}&c={{conta}}")
            .expect("substitute");
        assert_eq!(url, "https://x.pt/r?de=2024-03-04&ate=2024-03-10&c=PT-991");
        assert_eq!(
            variables.substitute("{{periodo_inicio_pt}}").expect("pt"),
            "04-03-2024"
        );
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let variables = Variables::new();
        assert_eq!(
            variables.substitute("#user-{{missing}}"),
            Err(VariableError::Unknown("missing".to_string()))
        );
        assert_eq!(variables.substitute("plain").expect("plain"), "plain");
    }

    #[test]
    fn secrets_are_redacted_and_never_public() {
        let mut variables = Variables::new();
        variables.insert("username", "frota@parceiro.pt");
        variables.insert_secret("password", "s3gredo!");

        assert!(variables.references_secret("{{password}}"));
        assert!(!variables.references_secret("{{username}}"));
        assert_eq!(
            variables.redact("login failed for s3gredo!"),
            "login failed for ***"
        );
        let public = variables.public();
        assert_eq!(public.get("username").map(String::as_str), Some("frota@parceiro.pt"));
        assert!(!public.contains_key("password"));
    }
}
