use crate::Error;

/// Convenience trait to easily convert errors to `Error::InvalidFrame`
pub trait ResultExt<T> {
    fn or_invalid_frame(self) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E> {
    fn or_invalid_frame(self) -> Result<T, Error> {
        self.or(Err(Error::InvalidFrame))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn or_invalid_frame(self) -> Result<T, Error> {
        self.ok_or(Error::InvalidFrame)
    }
}

/// Splits one leading field off `rest`, returning `(field, remainder)`.
///
/// The separator is exactly one space; anything after it is left untouched so
/// a trailing free-text field keeps its own spacing.
pub fn split_field(rest: &str) -> Result<(&str, &str), Error> {
    match rest.split_once(' ') {
        Some((field, remainder)) if !field.is_empty() => Ok((field, remainder)),
        _ => Err(Error::InvalidFrame),
    }
}

/// Takes the final field of a frame. The field must be present (preceded by
/// its separator) but may be empty.
pub fn free_text(rest: Option<&str>) -> Result<String, Error> {
    rest.map(String::from).or_invalid_frame()
}

#[cfg(test)]
mod test {
    use super::split_field;

    #[test]
    fn test_split_field_keeps_remainder_verbatim() {
        assert_eq!(split_field("bob  two spaces").unwrap(), ("bob", " two spaces"));
        assert_eq!(split_field("bob ").unwrap(), ("bob", ""));
        assert!(split_field("bob").is_err());
        assert!(split_field(" leading").is_err());
    }
}
