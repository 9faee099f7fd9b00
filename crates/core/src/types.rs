use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a workflow definition
    WorkflowId
);
uuid_id!(
    /// Unique identifier for a step definition
    StepId
);
uuid_id!(
    /// Unique identifier for a workflow run
    RunId
);
uuid_id!(
    /// Unique identifier for one attempt of one step within a run
    StepRunId
);
uuid_id!(
    /// Unique identifier for an LLM call log row
    LlmLogId
);

/// Status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Runs only move forward: pending -> running -> {completed | failed}.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Transformation applied to a successful step's output before it is handed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    Full,
    CodeOnly,
    JsonOnly,
    #[default]
    Summary,
}

/// Deterministic completion rule applied to raw step output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Contains,
    Regex,
    JsonValid,
    CodeBlockPresent,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Contains => "contains",
            RuleType::Regex => "regex",
            RuleType::JsonValid => "json_valid",
            RuleType::CodeBlockPresent => "code_block_present",
        }
    }

    /// Whether the rule needs a `rule_value` to be evaluated
    pub fn requires_value(self) -> bool {
        matches!(self, RuleType::Contains | RuleType::Regex)
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of LLM invocation recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Main,
    Retry,
    LlmJudge,
}

impl CallType {
    /// Main call type for a step attempt; the first attempt is `main`, later ones `retry`.
    pub fn for_attempt(attempt_number: u32) -> Self {
        if attempt_number > 1 {
            CallType::Retry
        } else {
            CallType::Main
        }
    }
}

/// A named, ordered list of step definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            description,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Steps sorted by position
    pub fn ordered_steps(&self) -> Vec<StepDefinition> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.position);
        steps
    }

    pub fn step(&self, step_id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == *step_id)
    }

    /// Insert a step at its requested position, shifting later steps down.
    /// Positions outside `1..=len+1` are clamped so the sequence stays dense.
    pub fn insert_step(&mut self, mut step: StepDefinition) {
        let mut steps = self.ordered_steps();
        let index = (step.position.max(1) as usize - 1).min(steps.len());
        step.position = 0;
        steps.insert(index, step);
        self.steps = steps;
        self.renumber();
    }

    /// Move an existing step to a new position.
    pub fn move_step(&mut self, step_id: &StepId, position: u32) -> bool {
        let mut steps = self.ordered_steps();
        let Some(current) = steps.iter().position(|s| s.id == *step_id) else {
            return false;
        };
        let step = steps.remove(current);
        let index = (position.max(1) as usize - 1).min(steps.len());
        steps.insert(index, step);
        self.steps = steps;
        self.renumber();
        true
    }

    /// Remove a step and close the gap it leaves.
    pub fn remove_step(&mut self, step_id: &StepId) -> Option<StepDefinition> {
        let index = self.steps.iter().position(|s| s.id == *step_id)?;
        let removed = self.steps.remove(index);
        self.steps.sort_by_key(|s| s.position);
        self.renumber();
        Some(removed)
    }

    /// Mark the definition as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn renumber(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.position = i as u32 + 1;
        }
        self.touch();
    }
}

/// One configured unit of work inside a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub position: u32,
    pub name: String,
    pub prompt_template: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default)]
    pub context_mode: ContextMode,
    pub rule_type: RuleType,
    #[serde(default)]
    pub rule_value: Option<String>,
    #[serde(default)]
    pub llm_judge_enabled: bool,
    #[serde(default)]
    pub llm_judge_prompt: Option<String>,
}

pub const DEFAULT_MODEL: &str = "kimi-k2p5";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_retry_limit() -> u32 {
    3
}

impl StepDefinition {
    /// A step with the service defaults for model parameters and retry budget
    pub fn new(
        position: u32,
        name: impl Into<String>,
        prompt_template: impl Into<String>,
        rule_type: RuleType,
    ) -> Self {
        Self {
            id: StepId::new(),
            position,
            name: name.into(),
            prompt_template: prompt_template.into(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry_limit: default_retry_limit(),
            context_mode: ContextMode::default(),
            rule_type,
            rule_value: None,
            llm_judge_enabled: false,
            llm_judge_prompt: None,
        }
    }

    /// Upper bound on attempts for this step
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }
}

/// One execution instance of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    pub failure_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn pending(workflow_id: WorkflowId) -> Self {
        Self {
            id: RunId::new(),
            workflow_id,
            status: RunStatus::Pending,
            failure_reason: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Audit row for a single attempt of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub id: StepRunId,
    pub workflow_run_id: RunId,
    pub workflow_step_id: StepId,
    pub position: u32,
    pub status: StepStatus,
    pub attempt_number: u32,
    pub input_context: String,
    pub output: Option<String>,
    pub extracted_context: Option<String>,
    pub evaluation_result: Option<EvaluationResult>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of the completion evaluation of one attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed: bool,
    pub reason: Option<String>,
    pub rule_passed: Option<bool>,
    pub rule_reason: Option<String>,
    pub judge_passed: Option<bool>,
    pub judge_reason: Option<String>,
    #[serde(default)]
    pub judge_skipped: bool,
    pub error: Option<String>,
}

/// One row per actual LLM invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallLog {
    pub id: LlmLogId,
    pub step_run_id: StepRunId,
    pub call_type: CallType,
    pub attempt_number: u32,
    pub prompt: String,
    pub response: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub model: String,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Run status snapshot with its attempts in execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: WorkflowRun,
    pub step_runs: Vec<StepRun>,
}
