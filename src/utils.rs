use rand::Rng;

/// slash quoting for digest strings
pub trait QuoteForDigest {
    fn quote_for_digest(&self) -> String;
}

impl QuoteForDigest for &str {
    fn quote_for_digest(&self) -> String {
        self.to_string().quote_for_digest()
    }
}

impl QuoteForDigest for String {
    fn quote_for_digest(&self) -> String {
        self.replace('\\', "\\\\").replace('"', "\\\"")
    }
}

/// Generate a fresh client nonce: 16 random bytes, hex encoded.
pub(crate) fn gen_cnonce() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!("plain".quote_for_digest(), "plain");
        assert_eq!(r#"a"b\c"#.quote_for_digest(), r#"a\"b\\c"#);
    }

    #[test]
    fn cnonce_shape() {
        let c = gen_cnonce();
        assert_eq!(c.len(), 32);
        assert!(c.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(c, gen_cnonce());
    }
}
