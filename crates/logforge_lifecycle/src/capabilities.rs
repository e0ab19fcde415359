//! Linux capability dropping (spec.md §4.7 "Drop Linux capabilities to a
//! fixed whitelist ... when configured").

use caps::{CapSet, Capability};
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};

/// The fixed whitelist named in spec.md §4.7. Anything outside this set
/// is dropped from the effective, permitted, and inheritable sets.
const WHITELIST: &[Capability] = &[
    Capability::CAP_NET_BIND_SERVICE,
    Capability::CAP_SETUID,
    Capability::CAP_SETGID,
    Capability::CAP_DAC_OVERRIDE,
    Capability::CAP_SYSLOG,
    Capability::CAP_SYS_CHROOT,
    Capability::CAP_SYS_RESOURCE,
    Capability::CAP_CHOWN,
    Capability::CAP_LEASE,
    Capability::CAP_NET_ADMIN,
    Capability::CAP_NET_RAW,
    Capability::CAP_BLOCK_SUSPEND,
    Capability::CAP_SYS_ADMIN,
];

/// Drop every capability outside [`WHITELIST`] from all three of the
/// process's capability sets. A failure here is process-wide (spec.md
/// §7): the caller should treat it as a fatal startup error, not log and
/// continue with a broader-than-configured privilege set.
pub fn drop_to_whitelist() -> Result<()> {
    let keep: std::collections::HashSet<Capability> = WHITELIST.iter().copied().collect();

    for set in [CapSet::Effective, CapSet::Permitted, CapSet::Inheritable] {
        caps::set(None, set, &keep).map_err(|e| {
            LogforgeError::with_source(ErrorKind::Io, format!("dropping capabilities ({set:?})"), e)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for cap in WHITELIST {
            assert!(seen.insert(*cap), "duplicate capability in whitelist: {cap:?}");
        }
    }
}
