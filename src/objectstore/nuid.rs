//! NUID generation: a 22-character base62 token, 12 random prefix characters
//! plus a 10-character incrementing sequence. The prefix reseeds only on
//! sequence overflow, from a CSPRNG (`rand::thread_rng`, backed by the OS
//! RNG) so cross-instance uniqueness doesn't depend on a weak seed.

use parking_lot::Mutex;
use rand::Rng;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const PREFIX_LEN: usize = 12;
const SEQ_LEN: usize = 10;
/// 62^10, the size of the sequence space before a reseed is required.
const MAX_SEQ: u64 = 839_299_365_868_340_224;

struct NuidState {
    prefix: [u8; PREFIX_LEN],
    sequence: u64,
    increment: u64,
}

fn random_prefix() -> [u8; PREFIX_LEN] {
    let mut rng = rand::thread_rng();
    let mut prefix = [0u8; PREFIX_LEN];
    for slot in &mut prefix {
        *slot = ALPHABET[rng.gen_range(0..ALPHABET.len())];
    }
    prefix
}

/// A random increment in the same shape the reference NUID algorithm uses,
/// so successive sequence values fan out rather than walking linearly.
fn random_increment() -> u64 {
    rand::thread_rng().gen_range(33..=333)
}

impl NuidState {
    fn reseed() -> Self {
        NuidState {
            prefix: random_prefix(),
            sequence: rand::thread_rng().gen_range(0..MAX_SEQ),
            increment: random_increment(),
        }
    }

    fn next(&mut self) -> String {
        self.sequence += self.increment;
        if self.sequence >= MAX_SEQ {
            *self = NuidState::reseed();
        }

        let mut token = String::with_capacity(PREFIX_LEN + SEQ_LEN);
        token.push_str(std::str::from_utf8(&self.prefix).unwrap());
        token.push_str(&encode_base62_fixed_width(self.sequence, SEQ_LEN));
        token
    }
}

fn encode_base62_fixed_width(mut value: u64, width: usize) -> String {
    let mut digits = vec![0u8; width];
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(value % 62) as usize];
        value /= 62;
    }
    String::from_utf8(digits).unwrap()
}

/// Generates fresh object NUIDs. One instance is shared by a
/// [`crate::objectstore::ObjectStore`] across its lifetime, matching the
/// source's single reseed-on-overflow generator.
pub struct NuidGenerator {
    state: Mutex<NuidState>,
}

impl NuidGenerator {
    pub fn new() -> Self {
        NuidGenerator {
            state: Mutex::new(NuidState::reseed()),
        }
    }

    pub fn next(&self) -> String {
        self.state.lock().next()
    }
}

impl Default for NuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_22_base62_characters() {
        let gen = NuidGenerator::new();
        let token = gen.next();
        assert_eq!(token.len(), PREFIX_LEN + SEQ_LEN);
        assert!(token.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn successive_tokens_share_a_prefix_but_differ() {
        let gen = NuidGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert_eq!(&a[..PREFIX_LEN], &b[..PREFIX_LEN]);
    }

    #[test]
    fn reseeding_on_overflow_changes_the_prefix() {
        let mut state = NuidState {
            prefix: *b"AAAAAAAAAAAA",
            sequence: MAX_SEQ - 1,
            increment: 1,
        };
        let prefix_before = state.prefix;
        state.next();
        assert_ne!(state.prefix, prefix_before);
    }
}
