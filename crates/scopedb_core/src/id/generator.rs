//! Identifier generation.

use super::entity_id::{EntityId, ID_LEN};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

const COUNTER_MASK: u32 = 0x00FF_FFFF;

/// Generates ObjectId-layout identifiers.
///
/// Layout: `[4-byte unix seconds][5-byte random][3-byte counter]`, the
/// same split a MongoDB ObjectId uses.
///
/// The random component is a hash of the call's nanosecond timestamp, the
/// host name and the process id, so concurrent processes on different
/// machines diverge without coordination. The counter is 24 bits and wraps
/// silently; two ids can only collide if one process produces more than
/// 2^24 ids within the same second and the random part also repeats.
#[derive(Debug)]
pub struct IdGenerator {
    host_hash: [u8; 32],
    process_id: u32,
    counter: AtomicU32,
}

impl IdGenerator {
    /// Creates a generator for this host and process, with a random counter seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_identity(&hostname(), std::process::id(), rand::random::<u32>())
    }

    /// Creates a generator with explicit host, process and counter seed.
    #[must_use]
    pub fn with_identity(host: &str, process_id: u32, counter_seed: u32) -> Self {
        Self {
            host_hash: Sha256::digest(host.as_bytes()).into(),
            process_id,
            counter: AtomicU32::new(counter_seed & COUNTER_MASK),
        }
    }

    /// Produces the next identifier.
    pub fn next_id(&self) -> EntityId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.build(now.as_secs() as u32, now.as_nanos())
    }

    fn build(&self, seconds: u32, nanos: u128) -> EntityId {
        let count = self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
        let random = self.random_component(nanos);

        let mut bytes = [0u8; ID_LEN];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&random);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        EntityId::from_bytes(bytes)
    }

    fn random_component(&self, nanos: u128) -> [u8; 5] {
        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(self.host_hash);
        hasher.update(self.process_id.to_le_bytes());
        let digest = hasher.finalize();
        [digest[0], digest[1], digest[2], digest[3], digest[4]]
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the process-wide generator.
pub(crate) fn global() -> &'static IdGenerator {
    static GENERATOR: OnceLock<IdGenerator> = OnceLock::new();
    GENERATOR.get_or_init(IdGenerator::new)
}

/// Generates a new identifier and returns its hex form.
#[must_use]
pub fn generate_new_id() -> String {
    EntityId::generate().to_hex()
}

fn hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_within_a_process() {
        let generator = IdGenerator::new();
        let ids: HashSet<_> = (0..10_000).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn layout_embeds_seconds_and_counter() {
        let generator = IdGenerator::with_identity("host-a", 42, 0x0012_3456);
        let id = generator.build(0x6500_0000, 1);
        let bytes = id.as_bytes();
        assert_eq!(id.timestamp(), 0x6500_0000);
        assert_eq!(&bytes[9..12], &[0x12, 0x34, 0x56]);
    }

    #[test]
    fn counter_wraps_at_24_bits() {
        let generator = IdGenerator::with_identity("host-a", 1, COUNTER_MASK);
        let last = generator.build(0, 0);
        let wrapped = generator.build(0, 0);
        assert_eq!(&last.as_bytes()[9..12], &[0xff, 0xff, 0xff]);
        assert_eq!(&wrapped.as_bytes()[9..12], &[0x00, 0x00, 0x00]);
    }

    #[test]
    fn hosts_diverge_at_same_instant() {
        let a = IdGenerator::with_identity("host-a", 7, 0).build(100, 555);
        let b = IdGenerator::with_identity("host-b", 7, 0).build(100, 555);
        assert_ne!(a, b);
    }

    #[test]
    fn generated_hex_is_canonical() {
        let hex = generate_new_id();
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_ids_sort_by_second() {
        let generator = IdGenerator::new();
        let earlier = generator.build(1_000, 0);
        let later = generator.build(1_001, 0);
        assert!(earlier < later);
    }
}
