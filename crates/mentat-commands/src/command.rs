// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::sync::Arc;

/// One named argument slot of a command.
#[derive(Debug, Clone)]
pub struct CommandSection {
    pub name: String,
    pub required: bool,
    pub allow_multiple: bool,
    pub help_text: String,
}

impl CommandSection {
    pub fn new(name: impl Into<String>, required: bool, help_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required,
            allow_multiple: false,
            help_text: help_text.into(),
        }
    }

    /// Allow the section to appear more than once in a block.
    pub fn multiple(mut self) -> Self {
        self.allow_multiple = true;
        self
    }
}

/// Parsed section values, keyed by section name.
///
/// Sections without `allow_multiple` carry exactly one value; [`get`]
/// returns the first value either way and [`get_all`] the full list.
///
/// [`get`]: CommandArgs::get
/// [`get_all`]: CommandArgs::get_all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    values: BTreeMap<String, Vec<String>>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `section` (later values accumulate).
    pub fn push(&mut self, section: impl Into<String>, value: impl Into<String>) {
        self.values.entry(section.into()).or_default().push(value.into());
    }

    /// Replace the value list for `section` with a single value.
    pub fn set(&mut self, section: impl Into<String>, value: impl Into<String>) {
        self.values.insert(section.into(), vec![value.into()]);
    }

    pub fn get(&self, section: &str) -> Option<&str> {
        self.values.get(section).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, section: &str) -> &[String] {
        self.values.get(section).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, section: &str) -> bool {
        self.values.contains_key(section)
    }

    pub fn count(&self, section: &str) -> usize {
        self.values.get(section).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(section, values)` pairs in section-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Apply `f` to every stored value in place.  Useful from
    /// [`Command::transform_args`] implementations that normalise input
    /// (trimming quotes, expanding paths).
    pub fn map_values(mut self, f: impl Fn(&str) -> String) -> Self {
        for values in self.values.values_mut() {
            for v in values.iter_mut() {
                *v = f(v);
            }
        }
        self
    }
}

/// A command the parser can recognise and the dispatcher can execute.
///
/// `C` is the host-supplied capability bundle the command runs against; the
/// chat control panel and the MCP tool bridge each define their own context
/// type, so this crate imposes nothing beyond `execute`'s signature.
pub trait Command<C>: Send + Sync {
    fn name(&self) -> &str;
    fn help_text(&self) -> &str;
    fn sections(&self) -> &[CommandSection];

    /// Pre-execute normalisation of parsed arguments.  Identity by default.
    fn transform_args(&self, args: CommandArgs) -> CommandArgs {
        args
    }

    /// Structural validation beyond the parser's own checks.  The default
    /// implementation reports every missing required section.
    fn validate(&self, args: &CommandArgs) -> Vec<String> {
        self.sections()
            .iter()
            .filter(|s| s.required && !args.contains(&s.name))
            .map(|s| format!("missing required section: {}", s.name))
            .collect()
    }

    fn execute(&self, ctx: &mut C, args: CommandArgs) -> anyhow::Result<()>;
}

/// Name → command map.  One instance per control panel, injected by
/// construction.  Registration is idempotent by name: later wins.
pub struct CommandRegistry<C> {
    commands: BTreeMap<String, Arc<dyn Command<C>>>,
}

impl<C> CommandRegistry<C> {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, command: impl Command<C> + 'static) {
        self.register_arc(Arc::new(command));
    }

    pub fn register_arc(&mut self, command: Arc<dyn Command<C>>) {
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Command<C>>> {
        self.commands.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command<C>>> {
        self.commands.get(name).cloned()
    }

    /// All registered commands in name order.
    pub fn all(&self) -> Vec<Arc<dyn Command<C>>> {
        self.commands.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
