//! Reedline completion with Tab-triggered menu.
//!
//! Type "/" then Tab to see commands. Menu filters as you type.

use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, Emacs, Highlighter, KeyCode, KeyModifiers, MenuBuilder, Prompt,
    PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline, ReedlineEvent,
    ReedlineMenu, Span, StyledText, Suggestion,
};
use std::borrow::Cow;

/// All slash commands with descriptions
pub const COMMANDS: &[(&str, &str)] = &[
    ("/exit", "Exit"),
    ("/files", "List files in the work dir"),
    ("/help", "Show help"),
    ("/load", "Load a saved conversation"),
    ("/model", "Show or switch model"),
    ("/quit", "Exit"),
    ("/restart", "Start a fresh conversation and interpreter"),
    ("/save", "Save the conversation"),
    ("/sessions", "List saved conversations"),
    ("/tokens", "Show context usage"),
    ("/undo", "Undo the last upload"),
    ("/upload", "Upload a file into the work dir"),
];

/// Completer for codepot commands
#[derive(Clone, Default)]
pub struct PotCompleter {
    pub models: Vec<String>,
    pub sessions: Vec<String>,
}

impl PotCompleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_models(&mut self, models: Vec<String>) {
        self.models = models;
    }

    pub fn set_sessions(&mut self, sessions: Vec<String>) {
        self.sessions = sessions;
    }

    fn complete_argument(candidates: &[String], input: &str, pos: usize) -> Vec<Suggestion> {
        let prefix = input.split_whitespace().nth(1).unwrap_or("").to_lowercase();
        let start = input.find(' ').map(|i| i + 1).unwrap_or(pos);
        candidates
            .iter()
            .filter(|c| prefix.is_empty() || c.to_lowercase().starts_with(&prefix))
            .take(12)
            .map(|c| Suggestion {
                value: c.clone(),
                description: None,
                extra: None,
                span: Span::new(start, pos),
                append_whitespace: false,
                style: None,
            })
            .collect()
    }
}

impl Completer for PotCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if pos > line.len() {
            return Vec::new();
        }

        let input = &line[..pos];

        if input.is_empty() || !input.starts_with('/') {
            return Vec::new();
        }

        // Command completion (no space yet)
        if !input.contains(' ') {
            let prefix = input.to_lowercase();
            return COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(&prefix))
                .map(|(cmd, desc)| Suggestion {
                    value: cmd.to_string(),
                    description: Some(desc.to_string()),
                    extra: None,
                    span: Span::new(0, pos),
                    append_whitespace: true,
                    style: None,
                })
                .collect();
        }

        if input.starts_with("/model ") {
            return Self::complete_argument(&self.models, input, pos);
        }

        if input.starts_with("/load ") || input.starts_with("/save ") {
            return Self::complete_argument(&self.sessions, input, pos);
        }

        Vec::new()
    }
}

/// codepot prompt
pub struct PotPrompt {
    pub model_choice: String,
}

impl PotPrompt {
    pub fn new(model_choice: &str) -> Self {
        Self {
            model_choice: model_choice.to_string(),
        }
    }
}

impl Prompt for PotPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "\x1b[1;33mpot\x1b[0m \x1b[2m[{}]\x1b[0m",
            self.model_choice
        ))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed(" › ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(&self, hs: PromptHistorySearch) -> Cow<'_, str> {
        let prefix = match hs.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}search: {}) ", prefix, hs.term))
    }
}

/// Highlights known slash commands.
#[derive(Clone)]
pub struct PotHighlighter;

impl Highlighter for PotHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled = StyledText::new();

        if line.starts_with('/') {
            let cmd_end = line.find(' ').unwrap_or(line.len());
            let cmd = &line[..cmd_end];
            let is_valid = COMMANDS.iter().any(|(c, _)| *c == cmd);

            if is_valid {
                styled.push((Style::new().fg(Color::Cyan).bold(), cmd.to_string()));
            } else {
                styled.push((Style::new().fg(Color::Yellow), cmd.to_string()));
            }

            if cmd_end < line.len() {
                styled.push((Style::default(), line[cmd_end..].to_string()));
            }
        } else {
            styled.push((Style::default(), line.to_string()));
        }

        styled
    }
}

/// Create reedline with Tab-triggered completion menu
pub fn create_reedline(completer: PotCompleter) -> Reedline {
    let completion_menu = Box::new(
        ColumnarMenu::default()
            .with_name("completion_menu")
            .with_columns(1)
            .with_column_padding(2)
            .with_text_style(Style::new().fg(Color::Default))
            .with_selected_text_style(Style::new().fg(Color::Black).on(Color::Cyan))
            .with_description_text_style(Style::new().fg(Color::DarkGray)),
    );

    let mut keybindings = reedline::default_emacs_keybindings();

    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );

    keybindings.add_binding(
        KeyModifiers::SHIFT,
        KeyCode::BackTab,
        ReedlineEvent::MenuPrevious,
    );

    Reedline::create()
        .with_completer(Box::new(completer))
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_quick_completions(true)
        .with_partial_completions(true)
        .with_highlighter(Box::new(PotHighlighter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)))
}
