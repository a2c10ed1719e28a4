//! Parallelization Analyzer (component E): decides which of a batch of
//! proposed tool calls can run concurrently.

use crate::llm::ToolCall;

/// Predicate over an argument key name deciding whether it identifies a
/// distinct resource (spec §4.E's "any of `id`, `Id`, or ends with
/// `Id`/`ID`/`_id`" heuristic). Caller-overridable per spec §9's open
/// question.
pub trait ResourceKeyHeuristic: Send + Sync {
    fn is_resource_key(&self, key: &str) -> bool;
}

pub struct DefaultResourceKeyHeuristic;

impl ResourceKeyHeuristic for DefaultResourceKeyHeuristic {
    fn is_resource_key(&self, key: &str) -> bool {
        key == "id" || key == "Id" || key == "ID" || key.ends_with("Id") || key.ends_with("ID") || key.ends_with("_id")
    }
}

impl<F> ResourceKeyHeuristic for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_resource_key(&self, key: &str) -> bool {
        self(key)
    }
}

/// An ordered schedule of groups; calls within a group may run concurrently,
/// groups themselves run serially, in order.
pub type Schedule = Vec<Vec<ToolCall>>;

/// Plans a schedule for one batch of proposed tool calls (spec §4.E).
/// Distinct tools are never grouped together. Among same-tool calls: if a
/// resource-identifier argument key is present on every call in the run and
/// its values are pairwise distinct, group them; otherwise each runs in its
/// own (serial) group.
pub fn plan(calls: &[ToolCall], heuristic: &dyn ResourceKeyHeuristic) -> Schedule {
    let mut schedule: Schedule = Vec::new();
    let mut i = 0;
    while i < calls.len() {
        let name = &calls[i].name;
        let mut run_end = i + 1;
        while run_end < calls.len() && calls[run_end].name == *name {
            run_end += 1;
        }
        let run = &calls[i..run_end];
        schedule.extend(plan_same_tool_run(run, heuristic));
        i = run_end;
    }
    schedule
}

fn plan_same_tool_run(run: &[ToolCall], heuristic: &dyn ResourceKeyHeuristic) -> Schedule {
    if run.len() == 1 {
        return vec![run.to_vec()];
    }

    let resource_key = run[0]
        .arguments
        .keys()
        .find(|k| heuristic.is_resource_key(k));

    let Some(key) = resource_key else {
        return run.iter().cloned().map(|c| vec![c]).collect();
    };

    let mut values = Vec::with_capacity(run.len());
    for call in run {
        match call.arguments.get(key) {
            Some(v) => values.push(v.to_string()),
            None => return run.iter().cloned().map(|c| vec![c]).collect(),
        }
    }
    let mut sorted = values.clone();
    sorted.sort();
    sorted.dedup();
    if sorted.len() == values.len() {
        vec![run.to_vec()]
    } else {
        run.iter().cloned().map(|c| vec![c]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: args.as_object().unwrap().clone(),
            mcp_handle_id: None,
        }
    }

    #[test]
    fn distinct_tools_are_never_grouped() {
        let calls = vec![call("a", json!({})), call("b", json!({}))];
        let schedule = plan(&calls, &DefaultResourceKeyHeuristic);
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule[0].len(), 1);
        assert_eq!(schedule[1].len(), 1);
    }

    #[test]
    fn same_tool_with_distinct_resource_ids_groups_together() {
        let calls = vec![
            call("mark_item", json!({"itemId": "A", "status": "done"})),
            call("mark_item", json!({"itemId": "B", "status": "done"})),
            call("mark_item", json!({"itemId": "C", "status": "done"})),
        ];
        let schedule = plan(&calls, &DefaultResourceKeyHeuristic);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].len(), 3);
    }

    #[test]
    fn same_tool_without_resource_key_is_serial() {
        let calls = vec![
            call("do_thing", json!({"x": 1})),
            call("do_thing", json!({"x": 2})),
        ];
        let schedule = plan(&calls, &DefaultResourceKeyHeuristic);
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn same_tool_with_duplicate_resource_ids_is_serial() {
        let calls = vec![
            call("mark_item", json!({"itemId": "A"})),
            call("mark_item", json!({"itemId": "A"})),
        ];
        let schedule = plan(&calls, &DefaultResourceKeyHeuristic);
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn analyzer_is_stable_given_the_same_batch_twice() {
        let calls = vec![
            call("mark_item", json!({"itemId": "A"})),
            call("mark_item", json!({"itemId": "B"})),
        ];
        let first = plan(&calls, &DefaultResourceKeyHeuristic);
        let second = plan(&calls, &DefaultResourceKeyHeuristic);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].len(), second[0].len());
    }

    #[test]
    fn custom_heuristic_closure_is_accepted() {
        let heuristic = |k: &str| k == "slot";
        let calls = vec![
            call("mark_item", json!({"slot": "A"})),
            call("mark_item", json!({"slot": "B"})),
        ];
        let schedule = plan(&calls, &heuristic);
        assert_eq!(schedule.len(), 1);
    }
}
