#[cfg(test)]
mod tests {
    use crate::cluster::config::ClusterConfig;
    use crate::cluster::types::{MASTER_NODE, SiteId, site_id};
    use crate::coherence::registry::VariableRegistry;
    use crate::coherence::types::{CoherenceState, ValueSlot, Variable};
    use crate::runtime::service::Runtime;
    use std::sync::{Arc, Mutex};

    struct TestSlot(Mutex<u64>);

    impl TestSlot {
        fn new(value: u64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(value)))
        }
    }

    impl ValueSlot for TestSlot {
        fn size(&self) -> usize {
            std::mem::size_of::<u64>()
        }

        fn snapshot(&self) -> anyhow::Result<Vec<u8>> {
            Ok(bincode::serialize(&*self.0.lock().unwrap())?)
        }

        fn restore(&self, bytes: &[u8]) -> anyhow::Result<()> {
            *self.0.lock().unwrap() = bincode::deserialize(bytes)?;
            Ok(())
        }
    }

    fn loopback_config(num_nodes: usize, base_port: u16) -> ClusterConfig {
        ClusterConfig::new(vec!["127.0.0.1".parse().unwrap(); num_nodes], base_port)
    }

    async fn state_of(runtime: &Arc<Runtime>, id: SiteId) -> CoherenceState {
        let var = runtime
            .coherence()
            .registry()
            .get(id)
            .expect("Variable should be registered");
        let state = var.state.lock().await;
        state.coherence
    }

    // ============================================================
    // BOOTSTRAP STATE TESTS
    // ============================================================

    #[test]
    fn test_master_bootstraps_as_shared_owner() {
        let var = Variable::new(1, MASTER_NODE, TestSlot::new(0));
        let state = var.state.try_lock().unwrap();

        assert_eq!(state.coherence, CoherenceState::OwnerShared);
        assert!(state.coherence.is_owner());
    }

    #[test]
    fn test_slave_bootstraps_with_cached_copy_owned_by_master() {
        let var = Variable::new(1, 3, TestSlot::new(0));
        let state = var.state.try_lock().unwrap();

        assert_eq!(state.coherence, CoherenceState::RemoteCached);
        assert_eq!(state.remote_owner, MASTER_NODE);
        assert!(!state.coherence.is_owner());
    }

    #[test]
    fn test_only_owner_states_are_owner() {
        assert!(CoherenceState::OwnerExclusive.is_owner());
        assert!(CoherenceState::OwnerShared.is_owner());
        assert!(!CoherenceState::RemoteCached.is_owner());
        assert!(!CoherenceState::RemoteStale.is_owner());
    }

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[test]
    fn test_registry_insert_and_lookup() {
        let registry = VariableRegistry::new();
        assert!(registry.is_empty());

        let var = Arc::new(Variable::new(42, 0, TestSlot::new(7)));
        assert!(registry.insert(var));

        assert_eq!(registry.len(), 1);
        let found = registry.get(42).expect("Lookup should hit");
        assert_eq!(found.id, 42);
        assert!(registry.get(43).is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_id() {
        let registry = VariableRegistry::new();

        assert!(registry.insert(Arc::new(Variable::new(42, 0, TestSlot::new(1)))));
        assert!(!registry.insert(Arc::new(Variable::new(42, 0, TestSlot::new(2)))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_remove() {
        let registry = VariableRegistry::new();
        registry.insert(Arc::new(Variable::new(42, 0, TestSlot::new(1))));

        let removed = registry.remove(42);
        assert!(removed.is_some());
        assert!(registry.get(42).is_none());
        assert!(registry.remove(42).is_none());
    }

    // ============================================================
    // SINGLE-NODE ENGINE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_single_node_write_needs_no_invalidations() {
        // With no peers there is nothing to invalidate; the shared owner
        // must reach the exclusive state without parking.
        let config = loopback_config(1, 26200);
        let runtime = Runtime::start(config, 0).await.unwrap();

        let counter = runtime.register("single-node-counter", 5u64).unwrap();
        let id = counter.id();
        assert_eq!(state_of(&runtime, id).await, CoherenceState::OwnerShared);

        counter.write(6).await;

        assert_eq!(state_of(&runtime, id).await, CoherenceState::OwnerExclusive);
        assert_eq!(counter.read().await, 6);
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let config = loopback_config(1, 26210);
        let runtime = Runtime::start(config, 0).await.unwrap();

        let _first = runtime.register("twice-declared", 0u32).unwrap();
        let second = runtime.register("twice-declared", 0u32);

        assert!(second.is_err());
    }

    #[test]
    fn test_site_id_names_variables_consistently() {
        // Both "nodes" of a cluster derive the id from the same token.
        assert_eq!(site_id("app.rs:10"), site_id("app.rs:10"));
    }

    // ============================================================
    // TWO-NODE PROTOCOL SCENARIOS
    // ============================================================

    async fn two_node_cluster(base_port: u16) -> (Arc<Runtime>, Arc<Runtime>) {
        let config = loopback_config(2, base_port);
        let (master, slave) = tokio::join!(
            Runtime::start(config.clone(), 0),
            Runtime::start(config, 1),
        );
        (master.unwrap(), slave.unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bootstrap_read_is_local_on_both_sides() {
        let (master, slave) = two_node_cluster(26220).await;

        let a0 = master.register("counter-a", 0u64).unwrap();
        let a1 = slave.register("counter-a", 0u64).unwrap();
        let id = a0.id();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        // Both declarations carry the initial value, so the slave's copy is
        // born valid and the first read crosses no wire.
        assert_eq!(a1.read().await, 0);
        assert_eq!(state_of(&slave, id).await, CoherenceState::RemoteCached);
        assert_eq!(state_of(&master, id).await, CoherenceState::OwnerShared);
        assert_eq!(a0.read().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slave_write_migrates_ownership() {
        let (master, slave) = two_node_cluster(26230).await;

        let a0 = master.register("counter-a", 0u64).unwrap();
        let a1 = slave.register("counter-a", 0u64).unwrap();
        let id = a0.id();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        a1.write(1).await;

        assert_eq!(state_of(&slave, id).await, CoherenceState::OwnerExclusive);
        assert_eq!(state_of(&master, id).await, CoherenceState::RemoteStale);
        assert_eq!(a1.read().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_read_refreshes_from_new_owner() {
        let (master, slave) = two_node_cluster(26240).await;

        let a0 = master.register("counter-a", 0u64).unwrap();
        let a1 = slave.register("counter-a", 0u64).unwrap();
        let id = a0.id();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        a1.write(1).await;

        // The master's copy went stale with the grant; its next read asks
        // the new owner and comes back cached.
        assert_eq!(a0.read().await, 1);
        assert_eq!(state_of(&master, id).await, CoherenceState::RemoteCached);
        assert_eq!(state_of(&slave, id).await, CoherenceState::OwnerShared);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ownership_returns_to_master_on_write_back() {
        let (master, slave) = two_node_cluster(26250).await;

        let a0 = master.register("counter-a", 0u64).unwrap();
        let a1 = slave.register("counter-a", 0u64).unwrap();
        let id = a0.id();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        a1.write(1).await;
        assert_eq!(a0.read().await, 1);

        a0.write(2).await;

        assert_eq!(state_of(&master, id).await, CoherenceState::OwnerExclusive);
        assert_eq!(state_of(&slave, id).await, CoherenceState::RemoteStale);
        assert_eq!(a1.read().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_owner_invalidates_before_writing() {
        let (master, slave) = two_node_cluster(26260).await;

        let a0 = master.register("counter-a", 0u64).unwrap();
        let a1 = slave.register("counter-a", 0u64).unwrap();
        let id = a0.id();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        // Bootstrap leaves the master a shared owner with a valid cached
        // copy on the slave.
        assert_eq!(a1.read().await, 0);
        assert_eq!(state_of(&master, id).await, CoherenceState::OwnerShared);

        // The master's next write must collect the slave's invalidation ack
        // before it may proceed.
        a0.write(7).await;

        assert_eq!(state_of(&master, id).await, CoherenceState::OwnerExclusive);
        assert_eq!(state_of(&slave, id).await, CoherenceState::RemoteStale);
        assert_eq!(a1.read().await, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_back_to_back_cached_reads_stay_local() {
        let (master, slave) = two_node_cluster(26270).await;

        let a0 = master.register("counter-a", 3u64).unwrap();
        let a1 = slave.register("counter-a", 3u64).unwrap();
        let id = a0.id();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        for _ in 0..10 {
            assert_eq!(a1.read().await, 3);
            assert_eq!(state_of(&slave, id).await, CoherenceState::RemoteCached);
        }
        // The owner saw none of those reads.
        assert_eq!(state_of(&master, id).await, CoherenceState::OwnerShared);
        assert_eq!(a0.read().await, 3);
    }
}
