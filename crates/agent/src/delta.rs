//! Accumulates streamed message fragments into a whole message.
//!
//! Text fields concatenate across fragments; identity fields (`role`,
//! `id`, `type`) keep whatever arrived first. Tool-call fragments land at
//! their `index` hint when the server sends one, otherwise at their
//! position inside the fragment.

use quill_core::message::{Role, ToolCall};
use quill_core::provider::{FunctionDelta, MessageDelta, ToolCallDelta};

/// How far past the current end an `index` hint may point. Hints further
/// out append at the end instead.
const MAX_INDEX_GAP: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialToolCall {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub function: Option<PartialFunction>,
}

/// The message assembled so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialMessage {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<PartialToolCall>>,
}

fn concat(acc: &Option<String>, fragment: &Option<String>) -> Option<String> {
    match (acc, fragment) {
        (Some(a), Some(f)) => Some(format!("{a}{f}")),
        (None, Some(f)) => Some(f.clone()),
        (a, None) => a.clone(),
    }
}

fn first<T: Clone>(acc: &Option<T>, fragment: &Option<T>) -> Option<T> {
    acc.clone().or_else(|| fragment.clone())
}

impl PartialFunction {
    fn merged(&self, fragment: &FunctionDelta) -> Self {
        Self {
            name: concat(&self.name, &fragment.name),
            arguments: concat(&self.arguments, &fragment.arguments),
        }
    }
}

impl PartialToolCall {
    fn merged(&self, fragment: &ToolCallDelta) -> Self {
        let function = match (&self.function, &fragment.function) {
            (acc, None) => acc.clone(),
            (Some(acc), Some(f)) => Some(acc.merged(f)),
            (None, Some(f)) => Some(PartialFunction::default().merged(f)),
        };
        Self {
            id: first(&self.id, &fragment.id),
            kind: first(&self.kind, &fragment.kind),
            function,
        }
    }

    fn name(&self) -> &str {
        self.function
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .unwrap_or("")
    }
}

impl PartialMessage {
    /// Return a new accumulator with `fragment` folded in. `self` is left
    /// as it was.
    pub fn merged(&self, fragment: &MessageDelta) -> Self {
        let tool_calls = match &fragment.tool_calls {
            None => self.tool_calls.clone(),
            Some(deltas) => {
                let mut calls = self.tool_calls.clone().unwrap_or_default();
                for (pos, delta) in deltas.iter().enumerate() {
                    let slot = match delta.index.unwrap_or(pos) {
                        hint if hint.saturating_sub(calls.len()) > MAX_INDEX_GAP => calls.len(),
                        hint => hint,
                    };
                    if calls.len() <= slot {
                        calls.resize_with(slot + 1, PartialToolCall::default);
                    }
                    calls[slot] = calls[slot].merged(delta);
                }
                Some(calls)
            }
        };

        Self {
            role: first(&self.role, &fragment.role),
            content: concat(&self.content, &fragment.content),
            tool_calls,
        }
    }

    /// Merge a whole sequence of fragments, starting from empty.
    pub fn fold<'a>(fragments: impl IntoIterator<Item = &'a MessageDelta>) -> Self {
        fragments
            .into_iter()
            .fold(Self::default(), |acc, f| acc.merged(f))
    }

    /// True once any accumulated call has a non-empty function name.
    pub fn has_named_tool_call(&self) -> bool {
        self.tool_calls
            .as_ref()
            .is_some_and(|calls| calls.iter().any(|c| !c.name().is_empty()))
    }

    /// Split into text content and complete tool calls. Slots that never
    /// received a name are dropped; calls without an id get `call_{n}`.
    pub fn into_parts(self) -> (Option<String>, Vec<ToolCall>) {
        let calls = self
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .filter(|(_, c)| !c.name().is_empty())
            .map(|(n, c)| {
                let function = c.function.unwrap_or_default();
                let mut call = ToolCall::new(
                    c.id.unwrap_or_else(|| format!("call_{n}")),
                    function.name.unwrap_or_default(),
                    function.arguments.unwrap_or_default(),
                );
                if let Some(kind) = c.kind {
                    call.kind = kind;
                }
                call
            })
            .collect();
        (self.content, calls)
    }
}
