use crate::error::{Error, Result};
use regex::Regex;

pub const MAX_NAME_LENGTH: usize = 256;

/// Field validators applied at create time and re-applied opportunistically
/// to patched fields on update. Owned by the engine so deployments can
/// substitute stricter rules.
#[derive(Debug, Clone)]
pub struct Validators {
    element_id: Regex,
    max_name_length: usize,
}

impl Validators {
    pub fn new() -> Self {
        Self {
            // Hardcoded patterns, known to compile.
            element_id: Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").expect("valid id pattern"),
            max_name_length: MAX_NAME_LENGTH,
        }
    }

    /// Validate a local (non-namespaced) element id.
    pub fn validate_local_id(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::data_format("element id must not be empty"));
        }
        if !self.element_id.is_match(id) {
            return Err(Error::data_format(format!(
                "invalid element id '{}': ids must start with an alphanumeric character \
                 and contain only alphanumerics, dashes and underscores",
                id
            )));
        }
        Ok(())
    }

    pub fn validate_name(&self, name: &str) -> Result<()> {
        if name.len() > self.max_name_length {
            return Err(Error::data_format(format!(
                "element name exceeds {} characters",
                self.max_name_length
            )));
        }
        Ok(())
    }
}

impl Default for Validators {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_ids() {
        let validators = Validators::new();
        for id in ["model", "e1", "holding_bin", "Widget-2", "__mbee__"] {
            // __mbee__ starts with an underscore and is only ever created by
            // the system, so it is not expected to pass the user-facing rule.
            if id == "__mbee__" {
                assert!(validators.validate_local_id(id).is_err());
            } else {
                assert!(validators.validate_local_id(id).is_ok(), "{id}");
            }
        }
    }

    #[test]
    fn rejects_delimiters_and_empty() {
        let validators = Validators::new();
        assert!(validators.validate_local_id("").is_err());
        assert!(validators.validate_local_id("a:b").is_err());
        assert!(validators.validate_local_id("-leading").is_err());
        assert!(validators.validate_local_id("has space").is_err());
    }

    #[test]
    fn caps_name_length() {
        let validators = Validators::new();
        assert!(validators.validate_name(&"x".repeat(MAX_NAME_LENGTH)).is_ok());
        assert!(validators
            .validate_name(&"x".repeat(MAX_NAME_LENGTH + 1))
            .is_err());
    }
}
