use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Entropy behind every share token.
pub const SHARE_TOKEN_BYTES: usize = 32;

/// Generate an unguessable share token: 32 bytes from the thread-local CSPRNG,
/// encoded as URL-safe base64 without padding (43 characters).
pub fn generate_share_token() -> String {
    let mut bytes = [0u8; SHARE_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate_share_token();
        assert_eq!(token.len(), 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(URL_SAFE_NO_PAD.decode(&token).unwrap().len(), SHARE_TOKEN_BYTES);
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let tokens = (0..1000).map(|_| generate_share_token()).collect::<HashSet<_>>();
        assert_eq!(tokens.len(), 1000);
    }
}
