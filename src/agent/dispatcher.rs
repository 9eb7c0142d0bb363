//! Action Dispatch Loop
//!
//! Each turn asks the provider for the next action, carries it out against
//! the filesystem, the shell or the operator, and feeds a textual reply back
//! into the conversation. File and command failures become replies; only
//! provider and operator failures end the loop with an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::operator::{is_yes, Notice, Operator};
use super::safety::SafetyGate;
use super::session::{SessionContext, SessionStore};
use crate::ai::AiProvider;
use crate::executor::{CommandExecutor, LocalExecutor};
use crate::models::action::{ActionKind, ModelAction};
use crate::models::error::{AgentError, FileErrorKind, Result};
use crate::models::message::Message;

/// Longest reply echoed into the log in full
const LOGGED_REPLY_LIMIT: usize = 100;

/// Where the dispatch loop stands between turns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    AwaitingTurn,
    Ended,
}

/// What one action produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// User-role text sent back to the model
    pub text: String,
    /// Operator confirmed the issue is resolved
    pub resolved: bool,
}

impl TurnReply {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            resolved: false,
        }
    }
}

pub struct ActionDispatcher {
    provider: Arc<dyn AiProvider>,
    gate: SafetyGate,
    executor: Arc<dyn CommandExecutor>,
    operator: Box<dyn Operator>,
    store: SessionStore,
    context: SessionContext,
    workdir: PathBuf,
    conversation: Vec<Message>,
    state: DispatchState,
}

impl ActionDispatcher {
    /// `conversation` must already hold the opening user prompt
    pub fn new(
        provider: Arc<dyn AiProvider>,
        gate: SafetyGate,
        operator: Box<dyn Operator>,
        context: SessionContext,
        conversation: Vec<Message>,
    ) -> Self {
        let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            provider,
            gate,
            executor: Arc::new(LocalExecutor::new(workdir.clone())),
            operator,
            store: SessionStore::new(context.conversation_file.clone()),
            context,
            workdir,
            conversation,
            state: DispatchState::AwaitingTurn,
        }
    }

    /// Resolve file paths and run commands from `workdir` instead of the
    /// process directory. Replaces the executor with a local one there.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self.executor = Arc::new(LocalExecutor::new(self.workdir.clone()));
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Write the whole conversation out. A failed save is reported and the
    /// session carries on.
    pub fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.context.metadata(), &self.conversation) {
            self.operator
                .show(Notice::Warning, &format!("Failed to save conversation: {}", e));
        }
    }

    /// Run turns until the operator confirms a resolution
    pub async fn run(&mut self) -> Result<()> {
        while self.state == DispatchState::AwaitingTurn {
            self.step().await?;
        }
        Ok(())
    }

    /// One model turn: call, act, record, persist
    pub async fn step(&mut self) -> Result<DispatchState> {
        if self.state == DispatchState::Ended {
            return Ok(self.state);
        }

        let result = self.provider.call(&self.conversation, None, None).await?;
        info!("AI response received");

        let action = ModelAction::from_call_result(&result);
        let reply = self.apply(&action).await?;

        self.conversation.push(Message::assistant(result.to_json_string()));
        self.conversation.push(Message::user(reply.text.clone()));
        info!("User reply: {}", truncate_for_log(&reply.text));

        self.persist();

        if reply.resolved {
            info!("Issue resolved. Session ended.");
            self.operator
                .show(Notice::Success, "Issue resolved. Debug session completed.");
            self.operator.show(
                Notice::Info,
                &format!("Log saved to {}", self.context.log_file.display()),
            );
            self.operator.show(
                Notice::Info,
                &format!("Conversation saved to {}", self.store.path().display()),
            );
            self.state = DispatchState::Ended;
        }

        Ok(self.state)
    }

    /// Carry out a single action and build the reply for the model
    pub async fn apply(&mut self, action: &ModelAction) -> Result<TurnReply> {
        match &action.kind {
            ActionKind::RequestFile => Ok(TurnReply::reply(self.request_files(action).await)),
            ActionKind::UpdateFile => Ok(TurnReply::reply(self.update_file(action).await)),
            ActionKind::RunCommand => self.run_command(action).await.map(TurnReply::reply),
            ActionKind::RequestInput => self.request_input(action).map(TurnReply::reply),
            ActionKind::IssueResolved => self.issue_resolved(action),
            ActionKind::Message => self.message(action).map(TurnReply::reply),
            ActionKind::Unknown(token) => {
                warn!("{}", AgentError::UnknownAction(token.clone()));
                self.operator
                    .show(Notice::Warning, &format!("Unknown action from AI: '{}'", token));
                Ok(TurnReply::reply(format!(
                    "Error: Unknown action '{}'. Please specify a valid action.",
                    token
                )))
            }
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.workdir.join(path)
    }

    async fn request_files(&mut self, action: &ModelAction) -> String {
        let paths = action.detail_str_list("file_paths");
        if paths.is_empty() {
            self.operator.show(
                Notice::Warning,
                "AI requested files but didn't specify any file paths",
            );
            return "[Error: No file paths specified]".to_string();
        }

        self.operator.show(
            Notice::Ai,
            &format!("AI is reading {} file(s): {}", paths.len(), paths.join(", ")),
        );

        let mut reply = String::from("Here is the content of the requested files:\n\n");
        for path in &paths {
            let body = match read_file(&self.resolve(path)).await {
                Ok(content) => {
                    self.operator.show(
                        Notice::Debug,
                        &format!("Read file: {} ({} lines)", path, content.lines().count()),
                    );
                    content
                }
                Err((kind, message)) => {
                    self.operator.show(
                        Notice::Warning,
                        &format!("Cannot read {} ({}): {}", path, kind, message),
                    );
                    kind.reply_marker(&message)
                }
            };
            reply.push_str(&format!("<file name=\"{}\">\n{}\n</file>\n", path, body));
        }
        reply
    }

    async fn update_file(&mut self, action: &ModelAction) -> String {
        let (path, content) = match (action.detail_str("file_path"), action.detail_str("content")) {
            (Some(path), Some(content)) => (path.to_string(), content.to_string()),
            _ => {
                self.operator.show(
                    Notice::Warning,
                    "AI tried to update a file but didn't provide required details",
                );
                return "Error: No file path or content specified.".to_string();
            }
        };

        self.operator
            .show(Notice::Ai, &format!("AI is updating file: {}", path));

        let full_path = self.resolve(&path);
        match tokio::fs::write(&full_path, &content).await {
            Ok(()) => {
                self.operator.show(
                    Notice::Success,
                    &format!("Successfully updated {} ({} lines)", path, content.lines().count()),
                );
                format!("Updated {}.", path)
            }
            Err(e) => {
                let err = AgentError::file_operation(&e, &full_path);
                self.operator.show(Notice::Warning, &err.to_string());
                FileErrorKind::classify(&e, &full_path).write_reply(&e.to_string())
            }
        }
    }

    async fn run_command(&mut self, action: &ModelAction) -> Result<String> {
        let command = match action.detail_str("command").map(str::trim) {
            Some(command) if !command.is_empty() => command.to_string(),
            _ => {
                self.operator
                    .show(Notice::Warning, "AI asked to run a command but didn't specify one");
                return Ok("Error: No command specified.".to_string());
            }
        };

        self.operator
            .show(Notice::Ai, &format!("AI wants to run command: '{}'", command));

        let safe = self.gate.is_safe(&command).await;
        if safe {
            self.operator.show(Notice::Info, "Command evaluated as safe");
        } else {
            self.operator.show(
                Notice::Warning,
                "Command evaluated as potentially unsafe, confirmation required",
            );
        }

        let approved = safe
            || self
                .operator
                .confirm(&format!("Run '{}'? [y/n]", command))?;

        if !approved {
            self.operator.show(Notice::Info, "Command execution skipped");
            return Ok("Command skipped.".to_string());
        }

        self.operator
            .show(Notice::Info, &format!("Executing command: {}", command));

        let reply = match self.executor.execute(&command).await {
            Ok(result) if result.is_command_not_found() => {
                self.operator
                    .show(Notice::Warning, &format!("Command not found: {}", command));
                format!("Error: Command '{}' not found.", command)
            }
            Ok(result) if result.success() => {
                self.operator.show(Notice::Success, "Command executed successfully");
                format!("Command executed successfully. Output: {}", result.combined_output())
            }
            Ok(result) => {
                self.operator.show(
                    Notice::Warning,
                    &format!("Command failed with exit status {}", result.exit_code),
                );
                format!(
                    "Command failed with exit status {}. Output: {}",
                    result.exit_code,
                    result.combined_output()
                )
            }
            Err(AgentError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.operator
                    .show(Notice::Warning, &format!("Command not found: {}", command));
                format!("Error: Command '{}' not found.", command)
            }
            Err(e) => {
                self.operator
                    .show(Notice::Warning, &format!("Could not run '{}': {}", command, e));
                format!("Error: {}", e)
            }
        };
        Ok(reply)
    }

    fn request_input(&mut self, action: &ModelAction) -> Result<String> {
        self.operator
            .show(Notice::Ai, "AI is requesting additional information");
        if let Some(message) = &action.message {
            self.operator.show(Notice::Text, message);
        }

        let question = action
            .detail_str("question")
            .unwrap_or("Please provide more information:");
        let answer = self.operator.ask(question)?;
        self.operator
            .show(Notice::User, "Provided additional information to AI");
        Ok(answer)
    }

    fn issue_resolved(&mut self, action: &ModelAction) -> Result<TurnReply> {
        self.operator
            .show(Notice::Success, "AI suggests the issue is resolved");
        if let Some(message) = &action.message {
            self.operator.show(Notice::Text, message);
        }
        let solution = action.detail_str("solution").unwrap_or_default();
        self.operator
            .show(Notice::Text, &format!("Solution: {}", solution));

        let answer = self.operator.ask("Is the issue resolved? [y/n]")?;
        if answer.trim().eq_ignore_ascii_case("n") {
            let explanation = self
                .operator
                .ask("Please explain why the issue is not resolved:")?;
            self.operator.show(
                Notice::User,
                "Provided feedback that the issue is not resolved",
            );
            return Ok(TurnReply::reply(format!(
                "{}\nExplanation: {}",
                answer, explanation
            )));
        }

        let resolved = is_yes(&answer);
        if resolved {
            self.operator.show(Notice::Success, "Confirmed issue is resolved");
        }
        Ok(TurnReply {
            text: answer,
            resolved,
        })
    }

    fn message(&mut self, action: &ModelAction) -> Result<String> {
        self.operator.show(Notice::Ai, "AI message:");
        let body = action
            .detail_str("message")
            .or(action.message.as_deref())
            .unwrap_or_default();
        self.operator.show(Notice::Text, body);

        let answer = self.operator.ask("Your response:")?;
        self.operator.show(Notice::User, "Sent response to AI");
        Ok(answer)
    }
}

async fn read_file(path: &Path) -> std::result::Result<String, (FileErrorKind, String)> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| (FileErrorKind::classify(&e, path), e.to_string()))
}

fn truncate_for_log(reply: &str) -> String {
    if reply.chars().count() > LOGGED_REPLY_LIMIT {
        let head: String = reply.chars().take(LOGGED_REPLY_LIMIT - 3).collect();
        format!("{}...", head)
    } else {
        reply.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiProviderType, CallResult, ModelInfo, ToolSchema};
    use crate::executor::CommandResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out scripted results in order, then fails
    struct ScriptedProvider {
        results: Mutex<VecDeque<Result<CallResult>>>,
    }

    impl ScriptedProvider {
        fn new(results: Vec<Result<CallResult>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
            })
        }

        fn actions(actions: Vec<serde_json::Value>) -> Arc<Self> {
            Self::new(actions.into_iter().map(|a| Ok(CallResult::Structured(a))).collect())
        }
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        fn provider_type(&self) -> AiProviderType {
            AiProviderType::OpenAi
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                provider: AiProviderType::OpenAi,
                model: "scripted".to_string(),
                max_tokens: 1,
            }
        }

        async fn call(
            &self,
            _conversation: &[Message],
            _schema: Option<&ToolSchema>,
            _allowed_tokens: Option<u32>,
        ) -> Result<CallResult> {
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::EmptyResponse("script exhausted".to_string())))
        }
    }

    type Shown = Arc<Mutex<Vec<(Notice, String)>>>;

    /// Answers prompts from a script and records everything shown
    struct ScriptedOperator {
        answers: VecDeque<String>,
        prompts: Arc<Mutex<Vec<String>>>,
        shown: Shown,
    }

    impl Operator for ScriptedOperator {
        fn show(&mut self, notice: Notice, text: &str) {
            self.shown.lock().unwrap().push((notice, text.to_string()));
        }

        fn ask(&mut self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .pop_front()
                .ok_or_else(|| AgentError::Operator("no scripted answer".to_string()))
        }
    }

    /// Records commands and returns a fixed result
    struct FakeExecutor {
        result: CommandResult,
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(&self, command: &str) -> Result<CommandResult> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(self.result.clone())
        }
    }

    fn command_result(stdout: &str, exit_code: i32) -> CommandResult {
        CommandResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code,
            execution_time_ms: 1,
        }
    }

    struct Harness {
        dispatcher: ActionDispatcher,
        workdir: tempfile::TempDir,
        prompts: Arc<Mutex<Vec<String>>>,
        shown: Shown,
        executor: Arc<FakeExecutor>,
    }

    fn harness(
        model: Arc<ScriptedProvider>,
        gate_verdict: &str,
        answers: &[&str],
        command: CommandResult,
    ) -> Harness {
        let workdir = tempfile::tempdir().unwrap();
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let shown: Shown = Arc::new(Mutex::new(Vec::new()));
        let operator = ScriptedOperator {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            prompts: prompts.clone(),
            shown: shown.clone(),
        };
        let gate = SafetyGate::new(ScriptedProvider::actions(vec![json!({ "is_ok": gate_verdict })]));
        let executor = Arc::new(FakeExecutor {
            result: command,
            commands: Mutex::new(Vec::new()),
        });
        let context = SessionContext::with_id(
            "test01",
            &workdir.path().join("logs"),
            "debugging",
            "openai",
        );

        let dispatcher = ActionDispatcher::new(
            model,
            gate,
            Box::new(operator),
            context,
            vec![Message::user("The build is broken")],
        )
        .with_workdir(workdir.path())
        .with_executor(executor.clone());

        Harness {
            dispatcher,
            workdir,
            prompts,
            shown,
            executor,
        }
    }

    fn simple(answers: &[&str]) -> Harness {
        harness(ScriptedProvider::actions(vec![]), "1", answers, command_result("", 0))
    }

    fn action(value: serde_json::Value) -> ModelAction {
        ModelAction::from_call_result(&CallResult::Structured(value))
    }

    #[tokio::test]
    async fn test_request_missing_file_replies_not_found() {
        let mut h = simple(&[]);
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "request_file", "details": {"file_paths": ["/nonexistent"]}})))
            .await
            .unwrap();

        assert!(reply.text.contains("File not found"));
        assert!(reply.text.contains("<file name=\"/nonexistent\">"));
        assert!(!reply.resolved);
        assert_eq!(h.dispatcher.state(), DispatchState::AwaitingTurn);
    }

    #[tokio::test]
    async fn test_request_files_relative_to_workdir() {
        let mut h = simple(&[]);
        std::fs::write(h.workdir.path().join("notes.txt"), "hello").unwrap();
        std::fs::create_dir(h.workdir.path().join("src")).unwrap();

        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "request_file", "details": {"file_paths": ["notes.txt", "src"]}})))
            .await
            .unwrap();

        assert_eq!(
            reply.text,
            "Here is the content of the requested files:\n\n\
             <file name=\"notes.txt\">\nhello\n</file>\n\
             <file name=\"src\">\n[Error: Cannot read directory as a file]\n</file>\n"
        );
    }

    #[tokio::test]
    async fn test_request_without_paths() {
        let mut h = simple(&[]);
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "request_file", "details": {}})))
            .await
            .unwrap();
        assert_eq!(reply.text, "[Error: No file paths specified]");
    }

    #[tokio::test]
    async fn test_update_file_writes_and_confirms() {
        let mut h = simple(&[]);
        let reply = h
            .dispatcher
            .apply(&action(json!({
                "action": "update_file",
                "details": {"file_path": "fix.rs", "content": "fn main() {}\n"}
            })))
            .await
            .unwrap();

        assert_eq!(reply.text, "Updated fix.rs.");
        let written = std::fs::read_to_string(h.workdir.path().join("fix.rs")).unwrap();
        assert_eq!(written, "fn main() {}\n");
    }

    #[tokio::test]
    async fn test_update_file_failures_are_replies() {
        let mut h = simple(&[]);

        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "update_file", "details": {"file_path": "x.rs"}})))
            .await
            .unwrap();
        assert_eq!(reply.text, "Error: No file path or content specified.");

        let reply = h
            .dispatcher
            .apply(&action(json!({
                "action": "update_file",
                "details": {"file_path": "no/such/dir/x.rs", "content": "x"}
            })))
            .await
            .unwrap();
        assert_eq!(reply.text, "Error: Directory does not exist.");

        std::fs::create_dir(h.workdir.path().join("target")).unwrap();
        let reply = h
            .dispatcher
            .apply(&action(json!({
                "action": "update_file",
                "details": {"file_path": "target", "content": "x"}
            })))
            .await
            .unwrap();
        assert_eq!(reply.text, "Error: Cannot write to a directory. Please specify a file path.");
    }

    #[tokio::test]
    async fn test_safe_command_runs_without_asking() {
        let mut h = harness(ScriptedProvider::actions(vec![]), "1", &[], command_result("ok\n", 0));
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "run_command", "details": {"command": "cargo check"}})))
            .await
            .unwrap();

        assert_eq!(reply.text, "Command executed successfully. Output: ok\n");
        assert_eq!(*h.executor.commands.lock().unwrap(), vec!["cargo check".to_string()]);
        assert!(h.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_command_declined_by_operator() {
        let mut h = harness(ScriptedProvider::actions(vec![]), "0", &["n"], command_result("", 0));
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "run_command", "details": {"command": "rm -rf /"}})))
            .await
            .unwrap();

        assert_eq!(reply.text, "Command skipped.");
        assert!(h.executor.commands.lock().unwrap().is_empty());
        assert_eq!(*h.prompts.lock().unwrap(), vec!["Run 'rm -rf /'? [y/n]".to_string()]);
    }

    #[tokio::test]
    async fn test_gate_verdict_is_shown_before_confirmation() {
        let mut h = harness(ScriptedProvider::actions(vec![]), "0", &["n"], command_result("", 0));
        h.dispatcher
            .apply(&action(json!({"action": "run_command", "details": {"command": "rm -rf build"}})))
            .await
            .unwrap();

        assert!(h.shown.lock().unwrap().iter().any(|(notice, text)| {
            *notice == Notice::Warning && text.starts_with("Command evaluated as potentially unsafe")
        }));

        let mut h = harness(ScriptedProvider::actions(vec![]), "1", &[], command_result("", 0));
        h.dispatcher
            .apply(&action(json!({"action": "run_command", "details": {"command": "ls"}})))
            .await
            .unwrap();

        let shown = h.shown.lock().unwrap();
        assert!(shown
            .iter()
            .any(|(notice, text)| *notice == Notice::Info && text == "Command evaluated as safe"));
    }

    #[tokio::test]
    async fn test_unsafe_command_approved_by_operator() {
        let mut h = harness(ScriptedProvider::actions(vec![]), "0", &["y"], command_result("boom", 2));
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "run_command", "details": {"command": "make"}})))
            .await
            .unwrap();

        assert_eq!(reply.text, "Command failed with exit status 2. Output: boom");
        assert_eq!(h.executor.commands.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_command_not_found_is_a_reply() {
        let mut h = harness(ScriptedProvider::actions(vec![]), "1", &[], command_result("", 127));
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "run_command", "details": {"command": "frobnicate"}})))
            .await
            .unwrap();
        assert_eq!(reply.text, "Error: Command 'frobnicate' not found.");
    }

    #[tokio::test]
    async fn test_missing_command_is_a_reply() {
        let mut h = simple(&[]);
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "run_command", "details": {}})))
            .await
            .unwrap();
        assert_eq!(reply.text, "Error: No command specified.");
        assert!(h.executor.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_input_uses_question() {
        let mut h = simple(&["Ubuntu 24.04"]);
        let reply = h
            .dispatcher
            .apply(&action(json!({
                "action": "request_input",
                "details": {"question": "Which OS?"},
                "message": "I need more context"
            })))
            .await
            .unwrap();

        assert_eq!(reply.text, "Ubuntu 24.04");
        assert_eq!(*h.prompts.lock().unwrap(), vec!["Which OS?".to_string()]);
        assert!(h
            .shown
            .lock()
            .unwrap()
            .contains(&(Notice::Text, "I need more context".to_string())));
    }

    #[tokio::test]
    async fn test_message_prefers_detail_text() {
        let mut h = simple(&["thanks"]);
        let reply = h
            .dispatcher
            .apply(&action(json!({
                "action": "message",
                "details": {"message": "detail body"},
                "message": "top-level body"
            })))
            .await
            .unwrap();

        assert_eq!(reply.text, "thanks");
        assert_eq!(*h.prompts.lock().unwrap(), vec!["Your response:".to_string()]);
        assert!(h
            .shown
            .lock()
            .unwrap()
            .contains(&(Notice::Text, "detail body".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_action_reply() {
        let mut h = simple(&[]);
        let reply = h
            .dispatcher
            .apply(&action(json!({"action": "Dance", "details": {}})))
            .await
            .unwrap();
        assert_eq!(reply.text, "Error: Unknown action 'dance'. Please specify a valid action.");
    }

    #[tokio::test]
    async fn test_issue_not_resolved_keeps_going() {
        let model = ScriptedProvider::actions(vec![json!({
            "action": "issue_resolved",
            "details": {"solution": "done"},
            "message": "Fixed it"
        })]);
        let mut h = harness(model, "1", &["n", "tests still fail"], command_result("", 0));

        let state = h.dispatcher.step().await.unwrap();
        assert_eq!(state, DispatchState::AwaitingTurn);

        let conversation = h.dispatcher.conversation();
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[2], Message::user("n\nExplanation: tests still fail"));
    }

    #[tokio::test]
    async fn test_issue_resolved_ends_and_persists() {
        let resolved = json!({"action": "issue_resolved", "details": {"solution": "done"}});
        let mut h = harness(ScriptedProvider::actions(vec![resolved.clone()]), "1", &["y"], command_result("", 0));

        let state = h.dispatcher.step().await.unwrap();
        assert_eq!(state, DispatchState::Ended);

        let record = SessionStore::load(&h.dispatcher.context().conversation_file).unwrap();
        assert_eq!(
            record.messages,
            vec![
                Message::user("The build is broken"),
                Message::assistant(resolved.to_string()),
                Message::user("y"),
            ]
        );
        assert_eq!(record.metadata.use_case, "debugging");

        // Nothing more happens once ended
        assert_eq!(h.dispatcher.step().await.unwrap(), DispatchState::Ended);
        assert_eq!(h.dispatcher.conversation().len(), 3);
    }

    #[tokio::test]
    async fn test_text_turn_is_recorded_json_encoded() {
        let model = ScriptedProvider::new(vec![Ok(CallResult::Text("Have you tried turning it off?".to_string()))]);
        let mut h = harness(model, "1", &["yes"], command_result("", 0));

        h.dispatcher.step().await.unwrap();
        assert_eq!(
            h.dispatcher.conversation()[1],
            Message::assistant("\"Have you tried turning it off?\"")
        );
        assert_eq!(h.dispatcher.conversation()[2], Message::user("yes"));
    }

    #[tokio::test]
    async fn test_provider_error_is_terminal_and_leaves_conversation() {
        let model = ScriptedProvider::new(vec![Err(AgentError::RateLimit { status: 429 })]);
        let mut h = harness(model, "1", &[], command_result("", 0));

        let err = h.dispatcher.step().await.unwrap_err();
        assert!(matches!(err, AgentError::RateLimit { status: 429 }));
        assert_eq!(h.dispatcher.conversation().len(), 1);
    }

    #[tokio::test]
    async fn test_run_until_resolved() {
        let model = ScriptedProvider::actions(vec![
            json!({"action": "request_file", "details": {"file_paths": ["missing.rs"]}}),
            json!({"action": "message", "message": "Found it"}),
            json!({"action": "issue_resolved", "details": {"solution": "patched"}}),
        ]);
        let mut h = harness(model, "1", &["great", "y"], command_result("", 0));

        h.dispatcher.run().await.unwrap();
        assert_eq!(h.dispatcher.state(), DispatchState::Ended);
        assert_eq!(h.dispatcher.conversation().len(), 7);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short"), "short");
        let long = "x".repeat(150);
        let truncated = truncate_for_log(&long);
        assert_eq!(truncated.len(), 100);
        assert!(truncated.ends_with("..."));
    }
}
