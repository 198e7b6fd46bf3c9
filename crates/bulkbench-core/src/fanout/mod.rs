use std::collections::HashMap;
use std::future::Future;

use tokio::task::JoinSet;

use crate::types::NodeRef;

/// Result of the operation run on one node.
#[derive(Debug)]
pub struct NodeOutcome {
    pub node: NodeRef,
    pub result: anyhow::Result<()>,
}

/// Every node's outcome, in the order the operations finished.
#[derive(Debug, Default)]
pub struct FanOutReport {
    outcomes: Vec<NodeOutcome>,
}

impl FanOutReport {
    pub fn outcomes(&self) -> &[NodeOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// First failure observed, in completion order.
    pub fn first_error(&self) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.result.is_err())
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// `Ok` when every node succeeded, otherwise the first failure.
    pub fn into_result(self) -> Result<(), (NodeRef, anyhow::Error)> {
        for outcome in self.outcomes {
            if let Err(e) = outcome.result {
                return Err((outcome.node, e));
            }
        }
        Ok(())
    }
}

/// Run `op` once per node concurrently and wait for all of them.
///
/// A failing node never cancels the others: every operation runs to
/// completion and exactly one outcome is collected per node. A task that
/// panics is reported as that node's error.
pub async fn fan_out<F, Fut>(nodes: usize, op: F) -> FanOutReport
where
    F: Fn(NodeRef) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut set = JoinSet::new();
    let mut task_nodes = HashMap::with_capacity(nodes);

    for node in NodeRef::all(nodes) {
        let fut = op(node);
        let handle = set.spawn(async move { NodeOutcome { node, result: fut.await } });
        task_nodes.insert(handle.id(), node);
    }

    let mut outcomes = Vec::with_capacity(nodes);
    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let node = task_nodes
                    .get(&join_err.id())
                    .copied()
                    .unwrap_or(NodeRef(usize::MAX));
                NodeOutcome {
                    node,
                    result: Err(anyhow::anyhow!("task for {node} did not complete: {join_err}")),
                }
            }
        };
        if let Err(e) = &outcome.result {
            tracing::warn!("operation on {} failed: {e:#}", outcome.node);
        }
        outcomes.push(outcome);
    }

    FanOutReport { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn one_outcome_per_node() {
        let calls = Arc::new(AtomicUsize::new(0));
        let report = fan_out(5, |_node| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(report.len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(report.first_error().is_none());

        let mut nodes: Vec<usize> = report.outcomes().iter().map(|o| o.node.index()).collect();
        nodes.sort();
        assert_eq!(nodes, vec![0, 1, 2, 3, 4]);
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn zero_nodes_spawns_nothing() {
        let report = fan_out(0, |_node| async { Ok(()) }).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn failure_does_not_cancel_slower_nodes() {
        let finished = Arc::new(AtomicUsize::new(0));
        let report = fan_out(4, |node| {
            let finished = finished.clone();
            async move {
                if node.index() == 0 {
                    anyhow::bail!("copy failed");
                }
                tokio::time::sleep(Duration::from_millis(20 * node.index() as u64)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(report.len(), 4);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(report.failures(), 1);
        let (node, err) = report.into_result().unwrap_err();
        assert_eq!(node, NodeRef(0));
        assert_eq!(err.to_string(), "copy failed");
    }

    #[tokio::test]
    async fn first_error_is_first_to_finish() {
        let report = fan_out(3, |node| async move {
            match node.index() {
                1 => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    anyhow::bail!("slow failure")
                }
                2 => anyhow::bail!("fast failure"),
                _ => Ok(()),
            }
        })
        .await;

        assert_eq!(report.failures(), 2);
        assert_eq!(report.first_error().unwrap().node, NodeRef(2));
    }

    #[tokio::test]
    async fn panicking_task_becomes_node_error() {
        let report = fan_out(3, |node| async move {
            if node.index() == 1 {
                panic!("boom");
            }
            Ok(())
        })
        .await;

        assert_eq!(report.len(), 3);
        let (node, _) = report.into_result().unwrap_err();
        assert_eq!(node, NodeRef(1));
    }
}
