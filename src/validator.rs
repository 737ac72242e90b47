use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Field name → message. The first message recorded for a field wins, so
/// checks can run in priority order and every failing field is reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_per_field_wins() {
        let mut v = FieldErrors::new();
        v.check(false, "duration_minutes", "must be positive");
        v.check(false, "duration_minutes", "must not exceed 8 hours");
        v.check(true, "notes", "must not exceed 1000 characters");
        assert_eq!(v.len(), 1);
        assert_eq!(v.get("duration_minutes"), Some("must be positive"));
        assert!(v.into_result().is_err());
    }

    #[test]
    fn display_and_json() {
        let mut v = FieldErrors::single("scheduled_at", "must be in the future");
        v.add("agent_id", "must be provided");
        assert_eq!(
            v.to_string(),
            "agent_id: must be provided; scheduled_at: must be in the future"
        );
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["scheduled_at"], "must be in the future");
    }

    #[test]
    fn empty_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
