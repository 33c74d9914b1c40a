//! Validated six-digit instrument codes.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const CODE_LEN: usize = 6;

/// Error returned when an instrument code fails validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum InstrumentCodeError {
	/// The code does not have exactly six characters.
	#[error("Instrument code must have {expected} digits, got {len}.")]
	WrongLength {
		/// Required length.
		expected: usize,
		/// Observed character count.
		len: usize,
	},
	/// The code contains something other than ASCII digits.
	#[error("Instrument code must contain only ASCII digits.")]
	NonDigit,
}

/// Six ASCII digits identifying a listed instrument (e.g. `005930`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentCode(String);
impl InstrumentCode {
	/// Validates and wraps a code; surrounding whitespace is ignored.
	pub fn new(value: impl AsRef<str>) -> Result<Self, InstrumentCodeError> {
		let view = value.as_ref().trim();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Returns `true` when `value` would be accepted by [`InstrumentCode::new`].
	pub fn is_valid(value: &str) -> bool {
		validate_view(value).is_ok()
	}
}
impl Deref for InstrumentCode {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for InstrumentCode {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for InstrumentCode {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<InstrumentCode> for String {
	fn from(value: InstrumentCode) -> Self {
		value.0
	}
}
impl TryFrom<String> for InstrumentCode {
	type Error = InstrumentCodeError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl Debug for InstrumentCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "InstrumentCode({})", self.0)
	}
}
impl Display for InstrumentCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for InstrumentCode {
	type Err = InstrumentCodeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn validate_view(view: &str) -> Result<(), InstrumentCodeError> {
	let len = view.chars().count();

	if len != CODE_LEN {
		return Err(InstrumentCodeError::WrongLength { expected: CODE_LEN, len });
	}
	if !view.bytes().all(|b| b.is_ascii_digit()) {
		return Err(InstrumentCodeError::NonDigit);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn accepts_six_digits_only() {
		let code = InstrumentCode::new(" 005930 ").expect("Samsung code should be valid.");

		assert_eq!(&*code, "005930");
		assert_eq!(code.to_string(), "005930");
		assert_eq!(
			InstrumentCode::new("5930"),
			Err(InstrumentCodeError::WrongLength { expected: 6, len: 4 })
		);
		assert_eq!(InstrumentCode::new("00593A"), Err(InstrumentCodeError::NonDigit));
		assert_eq!(
			"００５９３０".parse::<InstrumentCode>(),
			Err(InstrumentCodeError::NonDigit),
			"Full-width digits are not ASCII."
		);
	}

	#[test]
	fn deserialization_enforces_validation() {
		let code: InstrumentCode =
			serde_json::from_str("\"000660\"").expect("Valid code should deserialize.");

		assert_eq!(code.as_ref(), "000660");
		assert!(serde_json::from_str::<InstrumentCode>("\"KODEX\"").is_err());
	}
}
