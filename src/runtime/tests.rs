#[cfg(test)]
mod tests {
    use crate::cluster::config::ClusterConfig;
    use crate::coherence::types::CoherenceState;
    use crate::runtime::service::Runtime;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    fn loopback_config(num_nodes: usize, base_port: u16) -> ClusterConfig {
        ClusterConfig::new(vec!["127.0.0.1".parse().unwrap(); num_nodes], base_port)
    }

    async fn two_node_cluster(base_port: u16) -> (Arc<Runtime>, Arc<Runtime>) {
        let config = loopback_config(2, base_port);
        let (master, slave) = tokio::join!(
            Runtime::start(config.clone(), 0),
            Runtime::start(config, 1),
        );
        (master.unwrap(), slave.unwrap())
    }

    async fn coherence_state(runtime: &Arc<Runtime>, id: u32) -> Option<CoherenceState> {
        let var = runtime.coherence().registry().get(id)?;
        let state = var.state.lock().await;
        Some(state.coherence)
    }

    // ============================================================
    // RUNTIME SURFACE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_runtime_exposes_cluster_shape() {
        let config = loopback_config(1, 26400);
        let runtime = Runtime::start(config, 0).await.unwrap();

        assert_eq!(runtime.node_id(), 0);
        assert_eq!(runtime.num_nodes(), 1);
        assert!(runtime.is_master());
    }

    #[tokio::test]
    async fn test_out_of_range_node_id_is_rejected() {
        let config = loopback_config(2, 26410);
        assert!(Runtime::start(config, 7).await.is_err());
    }

    // ============================================================
    // TYPED VALUE TESTS
    // ============================================================

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        label: [u8; 4],
        weight: u64,
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_struct_values_travel_whole() {
        let (master, slave) = two_node_cluster(26420).await;

        let initial = Sample { label: *b"none", weight: 0 };
        let s0 = master.register("sample", initial.clone()).unwrap();
        let s1 = slave.register("sample", initial).unwrap();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        let updated = Sample { label: *b"good", weight: 17 };
        s1.write(updated.clone()).await;

        assert_eq!(s0.read().await, updated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_update_builds_on_a_fresh_read() {
        let (master, slave) = two_node_cluster(26430).await;

        let c0 = master.register("rmw", 100u64).unwrap();
        let c1 = slave.register("rmw", 100u64).unwrap();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        c1.update(|v| *v += 1).await;
        assert_eq!(c1.read().await, 101);

        // The master refreshes, then modifies in place.
        assert_eq!(c0.read().await, 101);
        c0.update(|v| *v *= 2).await;
        assert_eq!(c1.read().await, 202);
    }

    // ============================================================
    // DESTRUCTION TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_destruction_publishes_the_final_value() {
        let (master, slave) = two_node_cluster(26440).await;

        let c0 = master.register("short-lived", 0u64).unwrap();
        let c1 = slave.register("short-lived", 0u64).unwrap();
        let id = c0.id();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        c1.write(42).await;
        c1.destroy().await;
        tokio::join!(master.barrier("teardown"), slave.barrier("teardown"));

        // The destroying node forgot the variable; the peer holds the last
        // published value as a plain cached copy.
        assert!(slave.coherence().registry().get(id).is_none());
        assert_eq!(coherence_state(&master, id).await, Some(CoherenceState::RemoteCached));
        assert_eq!(c0.read().await, 42);
    }

    // ============================================================
    // OWNERSHIP RACE TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 6)]
    async fn test_racing_writers_converge_on_one_owner() {
        let config = loopback_config(3, 26450);
        let (a, b, c) = tokio::join!(
            Runtime::start(config.clone(), 0),
            Runtime::start(config.clone(), 1),
            Runtime::start(config, 2),
        );
        let (master, slave1, slave2) = (a.unwrap(), b.unwrap(), c.unwrap());

        let v0 = master.register("contended", 0u64).unwrap();
        let v1 = slave1.register("contended", 0u64).unwrap();
        let v2 = slave2.register("contended", 0u64).unwrap();
        let id = v0.id();
        tokio::join!(
            master.barrier("setup"),
            slave1.barrier("setup"),
            slave2.barrier("setup"),
        );

        // Both slaves grab for ownership at once. The master serializes the
        // requests: one gets the grant, the other a redirect to the winner.
        let w1 = tokio::spawn(async move {
            v1.write(10).await;
            v1
        });
        let w2 = tokio::spawn(async move {
            v2.write(20).await;
            v2
        });
        let (v1, v2) = (w1.await.unwrap(), w2.await.unwrap());

        let mut owners = 0;
        for runtime in [&master, &slave1, &slave2] {
            if coherence_state(runtime, id).await.unwrap().is_owner() {
                owners += 1;
            }
        }
        assert_eq!(owners, 1, "Exactly one node may view itself as owner");

        // Whichever write landed last is what everyone reads now.
        let settled = v0.read().await;
        assert!(settled == 10 || settled == 20, "Unexpected value {}", settled);
        assert_eq!(v1.read().await, settled);
        assert_eq!(v2.read().await, settled);
    }

    // ============================================================
    // STRESS TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 6)]
    async fn test_alternating_increments_reach_the_target() {
        const TARGET: u64 = 1000;

        let (master, slave) = two_node_cluster(26460).await;

        let c0 = master.register("ping-pong", 0u64).unwrap();
        let c1 = slave.register("ping-pong", 0u64).unwrap();
        tokio::join!(master.barrier("setup"), slave.barrier("setup"));

        // The master bumps even values, the slave odd ones; every increment
        // drags ownership across the wire.
        let master_side = tokio::spawn(async move {
            loop {
                let value = c0.read().await;
                if value >= TARGET {
                    return c0;
                }
                if value % 2 == 0 {
                    c0.update(|v| *v += 1).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        });
        let slave_side = tokio::spawn(async move {
            loop {
                let value = c1.read().await;
                if value >= TARGET {
                    return c1;
                }
                if value % 2 == 1 {
                    c1.update(|v| *v += 1).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        });

        let (c0, c1) = (master_side.await.unwrap(), slave_side.await.unwrap());
        tokio::join!(master.barrier("done"), slave.barrier("done"));

        assert_eq!(c0.read().await, TARGET);
        assert_eq!(c1.read().await, TARGET);
    }
}
