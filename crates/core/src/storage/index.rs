use super::{DefinitionStore, ExecutionStore};
use crate::types::{
    LlmCallLog, RunDetail, RunId, RunStatus, StepRun, StepRunId, WorkflowDefinition, WorkflowId,
    WorkflowRun,
};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use redb::{Database, ReadOnlyTable, ReadableTable, TableDefinition, TableHandle};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;

const WORKFLOWS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflows");
const RUNS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflow_runs");
const SNAPSHOTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("run_snapshots");
const STEP_RUNS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("step_runs");
const LLM_LOGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("llm_logs");

/// Definition and execution store backed by redb
///
/// Rows are JSON. Attempt and log keys are prefixed with the run id and
/// zero-padded so that a range scan over one run returns rows in execution
/// order.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create index directory")?;
        }

        let db = Database::create(&path).context("Failed to create redb database")?;

        let write_txn = db.begin_write().context("Failed to begin write transaction")?;
        {
            for table in [
                WORKFLOWS_TABLE,
                RUNS_TABLE,
                SNAPSHOTS_TABLE,
                STEP_RUNS_TABLE,
                LLM_LOGS_TABLE,
            ] {
                write_txn
                    .open_table(table)
                    .with_context(|| format!("Failed to open {} table", table.name()))?;
            }
        }
        write_txn.commit().context("Failed to commit transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    fn read_row<T: DeserializeOwned>(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn.open_table(definition).context("Failed to open table")?;

        let value = table.get(key).context("Failed to get row")?;
        value
            .map(|guard| decode(guard.value(), definition.name()))
            .transpose()
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes).with_context(|| format!("Failed to deserialize {what} row"))
}

fn step_run_key(step_run: &StepRun) -> String {
    format!(
        "{}:{:06}:{:06}",
        step_run.workflow_run_id, step_run.position, step_run.attempt_number
    )
}

/// Rows of one run, in key order
fn scan_run<T: DeserializeOwned>(
    table: &ReadOnlyTable<&'static str, &'static [u8]>,
    run_id: &RunId,
    what: &str,
) -> Result<Vec<T>> {
    // ';' sorts right after ':', so this covers exactly the "{run_id}:" prefix
    let start = format!("{run_id}:");
    let end = format!("{run_id};");

    let mut rows = Vec::new();
    for item in table
        .range(start.as_str()..end.as_str())
        .with_context(|| format!("Failed to scan {what}"))?
    {
        let (_key, value) = item.context("Failed to read item")?;
        rows.push(decode(value.value(), what)?);
    }
    Ok(rows)
}

impl DefinitionStore for RedbStore {
    fn store_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let mut table = write_txn
                .open_table(WORKFLOWS_TABLE)
                .context("Failed to open table")?;

            let key = workflow.id.to_string();
            let value = serde_json::to_vec(workflow).context("Failed to serialize workflow")?;

            table
                .insert(key.as_str(), value.as_slice())
                .context("Failed to insert workflow")?;
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }

    fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>> {
        self.read_row(WORKFLOWS_TABLE, &workflow_id.to_string())
    }

    fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(WORKFLOWS_TABLE)
            .context("Failed to open table")?;

        let mut workflows = Vec::new();
        for item in table.iter().context("Failed to iterate workflows")? {
            let (_key, value) = item.context("Failed to read item")?;
            workflows.push(decode::<WorkflowDefinition>(value.value(), "workflow")?);
        }

        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }

    fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<bool> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        let removed = {
            let mut table = write_txn
                .open_table(WORKFLOWS_TABLE)
                .context("Failed to open table")?;
            let removed = table
                .remove(workflow_id.to_string().as_str())
                .context("Failed to delete workflow")?
                .is_some();
            removed
        };
        write_txn.commit().context("Failed to commit")?;
        Ok(removed)
    }
}

impl ExecutionStore for RedbStore {
    fn create_run(&self, run: &WorkflowRun, snapshot: &WorkflowDefinition) -> Result<()> {
        let key = run.id.to_string();
        let run_value = serde_json::to_vec(run).context("Failed to serialize run")?;
        let snapshot_value = serde_json::to_vec(snapshot).context("Failed to serialize snapshot")?;

        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let mut runs = write_txn.open_table(RUNS_TABLE).context("Failed to open table")?;
            if runs.get(key.as_str()).context("Failed to get run")?.is_some() {
                bail!("Run {} already exists", run.id);
            }
            runs.insert(key.as_str(), run_value.as_slice())
                .context("Failed to insert run")?;

            let mut snapshots = write_txn
                .open_table(SNAPSHOTS_TABLE)
                .context("Failed to open table")?;
            snapshots
                .insert(key.as_str(), snapshot_value.as_slice())
                .context("Failed to insert snapshot")?;
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }

    fn get_run(&self, run_id: &RunId) -> Result<Option<WorkflowRun>> {
        self.read_row(RUNS_TABLE, &run_id.to_string())
    }

    fn get_run_snapshot(&self, run_id: &RunId) -> Result<Option<WorkflowDefinition>> {
        self.read_row(SNAPSHOTS_TABLE, &run_id.to_string())
    }

    fn transition_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        failure_reason: Option<String>,
    ) -> Result<WorkflowRun> {
        let key = run_id.to_string();

        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        let run = {
            let mut runs = write_txn.open_table(RUNS_TABLE).context("Failed to open table")?;
            let current: Option<WorkflowRun> = runs
                .get(key.as_str())
                .context("Failed to get run")?
                .map(|guard| decode(guard.value(), "run"))
                .transpose()?;
            let mut run = current.with_context(|| format!("Run {} not found", run_id))?;

            if !run.status.can_transition_to(status) {
                bail!(
                    "Invalid transition for run {}: {} -> {}",
                    run_id,
                    run.status,
                    status
                );
            }

            let now = Utc::now();
            run.status = status;
            if status == RunStatus::Running {
                run.started_at = Some(now);
            }
            if status.is_terminal() {
                run.completed_at = Some(now);
            }
            if failure_reason.is_some() {
                run.failure_reason = failure_reason;
            }

            let value = serde_json::to_vec(&run).context("Failed to serialize run")?;
            runs.insert(key.as_str(), value.as_slice())
                .context("Failed to update run")?;
            run
        };
        write_txn.commit().context("Failed to commit")?;
        Ok(run)
    }

    fn record_attempt(&self, step_run: &StepRun, logs: &[LlmCallLog]) -> Result<()> {
        let run_key = step_run.workflow_run_id.to_string();
        let attempt_key = step_run_key(step_run);

        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let runs = write_txn.open_table(RUNS_TABLE).context("Failed to open table")?;
            let run: Option<WorkflowRun> = runs
                .get(run_key.as_str())
                .context("Failed to get run")?
                .map(|guard| decode(guard.value(), "run"))
                .transpose()?;
            let run = run.with_context(|| format!("Run {} not found", step_run.workflow_run_id))?;
            if run.status != RunStatus::Running {
                bail!(
                    "Run {} is {}, attempts can only be recorded while running",
                    run.id,
                    run.status
                );
            }

            let mut step_runs = write_txn
                .open_table(STEP_RUNS_TABLE)
                .context("Failed to open table")?;
            let value = serde_json::to_vec(step_run).context("Failed to serialize step run")?;
            step_runs
                .insert(attempt_key.as_str(), value.as_slice())
                .context("Failed to insert step run")?;

            let mut llm_logs = write_txn
                .open_table(LLM_LOGS_TABLE)
                .context("Failed to open table")?;
            for (index, log) in logs.iter().enumerate() {
                let key = format!("{}:{:02}", attempt_key, index);
                let value = serde_json::to_vec(log).context("Failed to serialize call log")?;
                llm_logs
                    .insert(key.as_str(), value.as_slice())
                    .context("Failed to insert call log")?;
            }
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }

    fn list_step_runs(&self, run_id: &RunId) -> Result<Vec<StepRun>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(STEP_RUNS_TABLE)
            .context("Failed to open table")?;
        scan_run(&table, run_id, "step run")
    }

    fn get_logs(&self, run_id: &RunId) -> Result<Vec<LlmCallLog>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(LLM_LOGS_TABLE)
            .context("Failed to open table")?;
        scan_run(&table, run_id, "call log")
    }

    fn get_step_run_logs(&self, run_id: &RunId, step_run_id: &StepRunId) -> Result<Vec<LlmCallLog>> {
        let mut logs = self.get_logs(run_id)?;
        logs.retain(|log| log.step_run_id == *step_run_id);
        Ok(logs)
    }

    fn list_runs(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowRun>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn.open_table(RUNS_TABLE).context("Failed to open table")?;

        let mut runs = Vec::new();
        for item in table.iter().context("Failed to iterate runs")? {
            let (_key, value) = item.context("Failed to read item")?;
            let run: WorkflowRun = decode(value.value(), "run")?;
            if run.workflow_id == *workflow_id {
                runs.push(run);
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    /// Run and attempts read from one snapshot of the database
    fn get_run_detail(&self, run_id: &RunId) -> Result<Option<RunDetail>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let runs = read_txn.open_table(RUNS_TABLE).context("Failed to open table")?;

        let run: Option<WorkflowRun> = runs
            .get(run_id.to_string().as_str())
            .context("Failed to get run")?
            .map(|guard| decode(guard.value(), "run"))
            .transpose()?;
        let Some(run) = run else {
            return Ok(None);
        };

        let step_runs_table = read_txn
            .open_table(STEP_RUNS_TABLE)
            .context("Failed to open table")?;
        let step_runs = scan_run(&step_runs_table, run_id, "step run")?;

        Ok(Some(RunDetail { run, step_runs }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallType, LlmLogId, RuleType, StepDefinition, StepRunId, StepStatus};
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RedbStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::new(dir.path().join("index").join("stepwise.redb")).unwrap();
        (dir, store)
    }

    fn workflow() -> WorkflowDefinition {
        let mut workflow = WorkflowDefinition::new("pipeline", Some("two steps".to_string()));
        workflow.insert_step(StepDefinition::new(1, "draft", "{{context}}", RuleType::JsonValid));
        workflow.insert_step(StepDefinition::new(2, "review", "{{context}}", RuleType::JsonValid));
        workflow
    }

    fn step_run(run: &WorkflowRun, step: &StepDefinition, attempt_number: u32) -> StepRun {
        let now = Utc::now();
        StepRun {
            id: StepRunId::new(),
            workflow_run_id: run.id,
            workflow_step_id: step.id,
            position: step.position,
            status: StepStatus::Failed,
            attempt_number,
            input_context: String::new(),
            output: Some("out".to_string()),
            extracted_context: None,
            evaluation_result: None,
            failure_reason: Some("nope".to_string()),
            started_at: now,
            completed_at: Some(now),
            created_at: now,
        }
    }

    fn log(step_run: &StepRun, call_type: CallType) -> LlmCallLog {
        LlmCallLog {
            id: LlmLogId::new(),
            step_run_id: step_run.id,
            call_type,
            attempt_number: step_run.attempt_number,
            prompt: "p".to_string(),
            response: "r".to_string(),
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
            cost_usd: 0.0,
            model: "kimi-k2p5".to_string(),
            latency_ms: 1,
            created_at: Utc::now(),
        }
    }

    fn running_run(store: &RedbStore, workflow: &WorkflowDefinition) -> WorkflowRun {
        let run = WorkflowRun::pending(workflow.id);
        store.create_run(&run, workflow).unwrap();
        store.transition_run(&run.id, RunStatus::Running, None).unwrap()
    }

    #[test]
    fn test_workflow_crud() {
        let (_dir, store) = open_store();
        let workflow = workflow();

        store.store_workflow(&workflow).unwrap();
        let loaded = store.get_workflow(&workflow.id).unwrap().unwrap();
        assert_eq!(loaded.name, "pipeline");
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(store.list_workflows().unwrap().len(), 1);

        assert!(store.delete_workflow(&workflow.id).unwrap());
        assert!(!store.delete_workflow(&workflow.id).unwrap());
        assert!(store.get_workflow(&workflow.id).unwrap().is_none());
    }

    #[test]
    fn test_run_lifecycle_and_snapshot() {
        let (_dir, store) = open_store();
        let workflow = workflow();
        let run = WorkflowRun::pending(workflow.id);

        store.create_run(&run, &workflow).unwrap();
        assert!(store.create_run(&run, &workflow).is_err());

        let snapshot = store.get_run_snapshot(&run.id).unwrap().unwrap();
        assert_eq!(snapshot.steps.len(), 2);

        let running = store.transition_run(&run.id, RunStatus::Running, None).unwrap();
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());

        let failed = store
            .transition_run(&run.id, RunStatus::Failed, Some("boom".to_string()))
            .unwrap();
        assert_eq!(failed.failure_reason.as_deref(), Some("boom"));
        assert!(failed.completed_at.is_some());

        assert!(store.transition_run(&run.id, RunStatus::Running, None).is_err());
        assert!(store.transition_run(&run.id, RunStatus::Completed, None).is_err());
        assert_eq!(store.get_run(&run.id).unwrap().unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let (_dir, store) = open_store();
        let workflow = workflow();
        let run = WorkflowRun::pending(workflow.id);
        store.create_run(&run, &workflow).unwrap();

        assert!(store.transition_run(&run.id, RunStatus::Completed, None).is_err());
    }

    #[test]
    fn test_attempts_are_ordered_by_position_then_attempt() {
        let (_dir, store) = open_store();
        let workflow = workflow();
        let run = running_run(&store, &workflow);
        let steps = workflow.ordered_steps();

        let second = step_run(&run, &steps[1], 1);
        let first_retry = step_run(&run, &steps[0], 2);
        let first = step_run(&run, &steps[0], 1);
        for attempt in [&second, &first_retry, &first] {
            store.record_attempt(attempt, &[log(attempt, CallType::Main)]).unwrap();
        }

        let order: Vec<(u32, u32)> = store
            .list_step_runs(&run.id)
            .unwrap()
            .iter()
            .map(|s| (s.position, s.attempt_number))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);

        let detail = store.get_run_detail(&run.id).unwrap().unwrap();
        assert_eq!(detail.step_runs.len(), 3);
    }

    #[test]
    fn test_logs_follow_attempt_and_call_order() {
        let (_dir, store) = open_store();
        let workflow = workflow();
        let run = running_run(&store, &workflow);
        let steps = workflow.ordered_steps();

        let first = step_run(&run, &steps[0], 1);
        store
            .record_attempt(&first, &[log(&first, CallType::Main), log(&first, CallType::LlmJudge)])
            .unwrap();
        let retry = step_run(&run, &steps[0], 2);
        store.record_attempt(&retry, &[log(&retry, CallType::Retry)]).unwrap();

        let call_types: Vec<CallType> = store
            .get_logs(&run.id)
            .unwrap()
            .iter()
            .map(|l| l.call_type)
            .collect();
        assert_eq!(call_types, vec![CallType::Main, CallType::LlmJudge, CallType::Retry]);

        let first_logs = store.get_step_run_logs(&run.id, &first.id).unwrap();
        assert_eq!(first_logs.len(), 2);
        assert!(first_logs.iter().all(|l| l.step_run_id == first.id));
    }

    #[test]
    fn test_rows_do_not_leak_between_runs() {
        let (_dir, store) = open_store();
        let workflow = workflow();
        let steps = workflow.ordered_steps();
        let run_a = running_run(&store, &workflow);
        let run_b = running_run(&store, &workflow);

        let attempt = step_run(&run_a, &steps[0], 1);
        store.record_attempt(&attempt, &[log(&attempt, CallType::Main)]).unwrap();

        assert!(store.list_step_runs(&run_b.id).unwrap().is_empty());
        assert!(store.get_logs(&run_b.id).unwrap().is_empty());
        assert_eq!(store.list_runs(&workflow.id).unwrap().len(), 2);
        assert!(store.list_runs(&WorkflowId::new()).unwrap().is_empty());
    }

    #[test]
    fn test_no_attempts_after_terminal_state() {
        let (_dir, store) = open_store();
        let workflow = workflow();
        let run = running_run(&store, &workflow);
        store.transition_run(&run.id, RunStatus::Completed, None).unwrap();

        let steps = workflow.ordered_steps();
        let late = step_run(&run, &steps[0], 1);
        assert!(store.record_attempt(&late, &[log(&late, CallType::Main)]).is_err());
        assert!(store.list_step_runs(&run.id).unwrap().is_empty());
        assert!(store.get_logs(&run.id).unwrap().is_empty());
    }

    #[test]
    fn test_no_attempts_before_running() {
        let (_dir, store) = open_store();
        let workflow = workflow();
        let run = WorkflowRun::pending(workflow.id);
        store.create_run(&run, &workflow).unwrap();

        let steps = workflow.ordered_steps();
        let early = step_run(&run, &steps[0], 1);
        assert!(store.record_attempt(&early, &[]).is_err());
    }
}
