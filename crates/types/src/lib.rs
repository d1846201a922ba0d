//! Validated primitive types shared across the hemogram workspace.
//!
//! Values of these types are checked once at construction, so code that receives them can rely
//! on the invariant without re-validating.

/// Errors that can occur when creating validated types.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input text is longer than the permitted maximum
    #[error("Text exceeds maximum length of {max} characters")]
    TooLong { max: usize },
    /// A concentration was zero, negative, NaN or infinite
    #[error("Concentration must be a finite positive number, got {0}")]
    InvalidConcentration(f64),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Like [`NonEmptyText::new`], but also bounds the trimmed length in characters.
    pub fn bounded(input: impl AsRef<str>, max: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        if text.0.chars().count() > max {
            return Err(TextError::TooLong { max });
        }
        Ok(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A white-cell concentration as reported by the haematology analyser.
///
/// Always finite and strictly positive. The unit is whatever the analyser reports
/// (conventionally 10^9 cells per litre); absolute counts inherit the same unit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct WbcConcentration(f64);

impl WbcConcentration {
    /// # Errors
    ///
    /// Returns `TextError::InvalidConcentration` for zero, negative or non-finite values.
    pub fn new(value: f64) -> Result<Self, TextError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(TextError::InvalidConcentration(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for WbcConcentration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for WbcConcentration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for WbcConcentration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = f64::deserialize(deserializer)?;
        WbcConcentration::new(v).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  blasts seen  ").unwrap();
        assert_eq!(text.as_str(), "blasts seen");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new(" \t\n"), Err(TextError::Empty));
    }

    #[test]
    fn bounded_text_rejects_long_input() {
        let err = NonEmptyText::bounded("abcdef", 5).unwrap_err();
        assert_eq!(err, TextError::TooLong { max: 5 });
        assert!(NonEmptyText::bounded("abcde", 5).is_ok());
    }

    #[test]
    fn non_empty_text_deserialize_rejects_blank() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"   \"");
        assert!(result.is_err());
    }

    #[test]
    fn concentration_rejects_non_positive_and_non_finite() {
        assert!(WbcConcentration::new(0.0).is_err());
        assert!(WbcConcentration::new(-1.2).is_err());
        assert!(WbcConcentration::new(f64::NAN).is_err());
        assert!(WbcConcentration::new(f64::INFINITY).is_err());
        assert_eq!(WbcConcentration::new(8.5).unwrap().value(), 8.5);
    }

    #[test]
    fn concentration_round_trips_through_json() {
        let wbc: WbcConcentration = serde_json::from_str("6.2").unwrap();
        assert_eq!(serde_json::to_string(&wbc).unwrap(), "6.2");
        assert!(serde_json::from_str::<WbcConcentration>("-3").is_err());
    }
}
