//! Generated record identifiers: `<prefix>:` + first 10 hex chars of
//! SHA-224 over the decimal counter.

use sha2::{Digest, Sha224};

/// Number of hex characters kept from the digest.
const ID_HEX_LEN: usize = 10;

/// Format one identifier for a given counter value.
pub fn generate_id(prefix: &str, counter: u64) -> String {
    let digest = Sha224::digest(counter.to_string().as_bytes());
    let mut id = String::with_capacity(prefix.len() + 1 + ID_HEX_LEN);
    id.push_str(prefix);
    id.push(':');
    // 10 hex chars == 5 digest bytes
    for byte in digest.iter().take(ID_HEX_LEN / 2) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// Stateful counter over [`generate_id`]. The counter is incremented before
/// use, so the first id hashes `"1"`.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    counter: u64,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        IdGenerator {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        self.counter += 1;
        generate_id(&self.prefix, self.counter)
    }
}
