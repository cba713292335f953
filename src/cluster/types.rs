/// Index of a node within the fixed membership. Node ids are dense: with `N`
/// nodes they run `0..N`.
pub type NodeId = u32;

/// Identity of a shared variable or barrier, derived from a source-site
/// token. Identical tokens produce identical ids on every node; this is the
/// whole naming contract.
pub type SiteId = u32;

/// The master node bootstraps as owner of every variable and coordinates
/// barriers.
pub const MASTER_NODE: NodeId = 0;

/// Hashes a source-site token into a [`SiteId`].
///
/// Folds the token bytes with the 65599 multiplier and mixes the high half
/// into the low one. Deterministic across processes and platforms.
pub fn site_id(token: &str) -> SiteId {
    let h = token
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(65599).wrapping_add(b as u32));
    h ^ (h >> 16)
}

/// Expands to a token naming the current source site, for use with
/// [`Runtime::register`](crate::runtime::service::Runtime::register) and
/// [`Runtime::barrier`](crate::runtime::service::Runtime::barrier).
///
/// Two nodes running the same binary get the same token at the same site.
#[macro_export]
macro_rules! site {
    () => {
        concat!(file!(), ":", line!())
    };
}
