//! Hook event definitions and metadata.

/// Hook events that trigger hook execution.
///
/// All trigger points are wired:
/// - `PreRun` — fired before tool spawn in `pipeline::execute_with_session_and_meta`
/// - `PostRun` — fired after every tool execution in `pipeline::execute_with_session_and_meta`
/// - `SessionComplete` — fired after session save in `pipeline::execute_with_session_and_meta`
/// - `TodoCreate` — fired after plan creation + git commit in `todo_cmd::handle_create` (no builtin; git already committed)
/// - `TodoSave` — fired after plan save + git commit in `todo_cmd::handle_save` (no builtin; git already committed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// After a session execution completes (success or failure).
    /// Triggered in `pipeline::execute_with_session` after session save.
    SessionComplete,
    /// After a new TODO plan is created.
    /// Triggered in `todo_cmd::handle_create` after git commit.
    TodoCreate,
    /// After a TODO plan is saved/updated.
    /// Triggered in `todo_cmd::handle_save` after git commit.
    TodoSave,
    /// Before a tool execution starts.
    /// Triggered in `pipeline::execute_with_session_and_meta` before `execute_with_transport`.
    PreRun,
    /// After a tool execution finishes.
    /// Triggered in `pipeline::execute_with_session_and_meta` after session save.
    PostRun,
}

impl HookEvent {
    /// Returns the TOML configuration key for this event.
    ///
    /// This key is used to look up hook configuration in `hooks.toml`:
    /// ```toml
    /// [session_complete]
    /// enabled = true
    /// command = "..."
    /// ```
    pub fn as_config_key(&self) -> &str {
        match self {
            HookEvent::SessionComplete => "session_complete",
            HookEvent::TodoCreate => "todo_create",
            HookEvent::TodoSave => "todo_save",
            HookEvent::PreRun => "pre_run",
            HookEvent::PostRun => "post_run",
        }
    }

    /// Returns the built-in default command template for this event.
    ///
    /// Built-in commands use template variables wrapped in `{braces}` that are
    /// substituted at runtime with actual values.
    ///
    /// Returns `None` for events that have no built-in default.
    ///
    /// `TodoCreate` and `TodoSave` have no builtins because `csa_todo::git::save()`
    /// already commits changes before hooks fire; a default `git commit` would fail
    /// on a clean index. Users can still configure custom commands via `hooks.toml`.
    pub fn builtin_command(&self) -> Option<&str> {
        match self {
            HookEvent::SessionComplete => Some(
                "cd {sessions_root} && git add {session_id}/ && git commit -m 'session {session_id} complete' -q --allow-empty",
            ),
            HookEvent::TodoCreate
            | HookEvent::TodoSave
            | HookEvent::PreRun
            | HookEvent::PostRun => None,
        }
    }
}
