use std::fmt;

use aliri_braid::braid;

/// A secret cut down to at most `max_chars` characters
///
/// The last visible character is replaced by `…` when anything is cut.
struct Prefix<'a>(&'a str, usize);

impl fmt::Display for Prefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Prefix(secret, max_chars) = *self;
        if max_chars <= 1 {
            return f.write_str("…");
        }

        match secret.char_indices().nth(max_chars - 1) {
            Some((cut, _)) => {
                f.write_str(&secret[..cut])?;
                f.write_str("…")
            }
            None => f.write_str(secret),
        }
    }
}

/// Hides a secret unless formatted with `#`
///
/// `{:#?}` shows a quoted prefix (the width, if given, overrides the
/// default length); `{:#}` shows the whole value.
macro_rules! redacted {
    ($ty:ty, $label:literal, $debug_chars:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if !f.alternate() {
                    return f.write_str(concat!("***", $label, "***"));
                }
                let max_chars = f.width().unwrap_or($debug_chars);
                write!(f, "\"{}\"", Prefix(self.as_str(), max_chars))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if !f.alternate() {
                    return f.write_str(concat!("***", $label, "***"));
                }
                let max_chars = f.width().unwrap_or(usize::MAX);
                write!(f, "{}", Prefix(self.as_str(), max_chars))
            }
        }
    };
}

/// An access token, sent as a bearer credential on ordinary requests
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

redacted!(AccessTokenRef, "ACCESS TOKEN", 15);

/// A refresh token, used only to obtain a new token set
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

redacted!(RefreshTokenRef, "REFRESH TOKEN", 5);
