//! Content hashing and revisioned file names.

use sha2::{Digest, Sha256};

/// Number of hex characters of the digest embedded in revisioned names.
pub const TOKEN_LEN: usize = 10;

/// Full SHA-256 hex digest of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Short content token: the first [`TOKEN_LEN`] hex characters of the digest.
pub fn content_token(bytes: &[u8]) -> String {
    let mut digest = content_digest(bytes);
    digest.truncate(TOKEN_LEN);
    digest
}

/// Insert `token` before the extension of the last path segment.
///
/// `images/logo.png` → `images/logo-<token>.png`; names without an extension
/// (including dotfiles such as `.htaccess`) get the token appended.
pub fn revisioned_name(relative: &str, token: &str) -> String {
    let (dir, file) = match relative.rfind('/') {
        Some(idx) => relative.split_at(idx + 1),
        None => ("", relative),
    };
    match file.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = file.split_at(dot);
            format!("{dir}{stem}-{token}{ext}")
        }
        _ => format!("{dir}{file}-{token}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn token_is_stable_and_short() {
        let a = content_token(b"body { color: red; }");
        let b = content_token(b"body { color: red; }");
        assert_eq!(a, b);
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_content_different_token() {
        assert_ne!(content_token(b"v1"), content_token(b"v2"));
        assert_ne!(content_token(b""), content_token(b"\n"));
    }

    #[test]
    fn token_is_digest_prefix() {
        let digest = content_digest(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(digest.starts_with(&content_token(b"abc")));
    }

    #[rstest]
    #[case("logo.png", "logo-0123456789.png")]
    #[case("images/icons/logo.png", "images/icons/logo-0123456789.png")]
    #[case("js/app.min.js", "js/app.min-0123456789.js")]
    #[case("fonts/LICENSE", "fonts/LICENSE-0123456789")]
    #[case(".htaccess", ".htaccess-0123456789")]
    #[case("v1.2/readme", "v1.2/readme-0123456789")]
    fn revisioned_names(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(revisioned_name(input, "0123456789"), expected);
    }
}
