use subtle::ConstantTimeEq;

/// Compare a presented shared secret against the configured one in constant time.
///
/// An empty configured secret never matches, so an unset secret locks the
/// endpoint instead of opening it.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let expected = expected.as_bytes();
    let presented = presented.as_bytes();
    if expected.len() != presented.len() {
        return false;
    }
    expected.ct_eq(presented).into()
}
