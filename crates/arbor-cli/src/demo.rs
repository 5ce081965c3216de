//! The built-in demo component: a list of labelled counters.
//!
//! Every entry of the `items` map gets its own counter state, and a
//! lifecycle that logs when its row appears and disappears.

use std::collections::BTreeMap;

use arbor_core::{
    assoc, lifecycle, map2, state_machine0, Computation, CoreError, Effect, GraphSnapshot, Inject,
    Lifecycle, Var,
};

/// One rendered row.
#[derive(Debug, Clone)]
pub struct Row {
    pub label: String,
    pub count: i64,
    pub increment: Inject<i64>,
}

pub struct Demo {
    pub items: Var<BTreeMap<u32, String>>,
    pub view: Computation<Vec<Row>>,
}

impl Demo {
    /// The validated graph snapshot of the view.
    pub fn snapshot(&self) -> Result<GraphSnapshot, CoreError> {
        let snapshot = GraphSnapshot::of_computation(&self.view)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

fn row_events(label: &str) -> Lifecycle {
    let shown = label.to_string();
    let hidden = label.to_string();
    Lifecycle::new()
        .on_activate(Effect::of_fn(move || tracing::info!(label = %shown, "row shown")))
        .on_deactivate(Effect::of_fn(move || tracing::info!(label = %hidden, "row hidden")))
}

pub fn counter_list() -> Demo {
    let items = Var::create(BTreeMap::from([(1, "apples".to_string()), (2, "pears".to_string())]));
    let rows = assoc(&items.value(), |_id, label| {
        state_machine0(0_i64, |_, count: i64, step: i64| count + step).sub(move |counter| {
            let events = label.map(|label: &String| row_events(label));
            lifecycle(&events).sub(move |_| {
                Computation::return_(&map2(
                    &counter,
                    &label,
                    |(count, increment): &(i64, Inject<i64>), label: &String| Row {
                        label: label.clone(),
                        count: *count,
                        increment: increment.clone(),
                    },
                ))
            })
        })
    });
    let view = rows.map(|rows: &BTreeMap<u32, Row>| rows.values().cloned().collect::<Vec<_>>());
    Demo { items, view }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_runtime::Driver;

    #[test]
    fn demo_graph_is_a_valid_snapshot() {
        let snapshot = counter_list().snapshot().unwrap();
        assert_eq!(snapshot.info[&arbor_core::NodePath::root()].node_type, "sub");
        let stable = arbor_storage::snapshot_to_stable(&snapshot);
        let text = arbor_storage::VersionedGraph::V2(stable).to_json().unwrap();
        assert!(arbor_storage::VersionedGraph::from_json(&text).is_ok());
        assert!(snapshot.to_dot().contains("assoc"));
    }

    #[test]
    fn rows_count_independently() {
        let demo = counter_list();
        let mut driver = Driver::new(&demo.view).unwrap();
        let first = driver.result().unwrap()[0].increment.clone();
        driver.schedule(first.call(2));
        driver.settle().unwrap();
        let counts: Vec<_> = driver
            .result()
            .unwrap()
            .iter()
            .map(|row| (row.label.clone(), row.count))
            .collect();
        assert_eq!(counts, vec![("apples".to_string(), 2), ("pears".to_string(), 0)]);

        demo.items.update(|items| {
            let mut items = items.clone();
            items.insert(3, "plums".to_string());
            items
        });
        driver.flush().unwrap();
        assert_eq!(driver.result().unwrap().len(), 3);
        assert_eq!(driver.result().unwrap()[0].count, 2);
    }
}
