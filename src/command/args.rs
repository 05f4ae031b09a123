//! Flag schema and argument builder for the external tools
//!
//! Arguments are kept as a structured list and handed to the process as an
//! argv, never through a shell. Valueless flags and valued flags are
//! separate enums so a value can't be attached to a switch or dropped from
//! an option.

use std::fmt;

/// Flags that take no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    /// Load-and-query mode
    Laq,
    Print,
    Json,
    /// Time-series output
    Time,
    Samples,
    Info,
    Tables,
}

impl Switch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Switch::Laq => "-laq",
            Switch::Print => "-print",
            Switch::Json => "-json",
            Switch::Time => "-time",
            Switch::Samples => "-samples",
            Switch::Info => "-info",
            Switch::Tables => "-tables",
        }
    }
}

/// Flags that are always followed by exactly one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opt {
    /// Group-by dimensions, comma separated
    Group,
    /// Integer columns to aggregate, comma separated
    Int,
    /// `col:op:val` string filters, comma separated
    StrFilter,
    /// `col:op:val` integer filters, comma separated
    IntFilter,
    TimeCol,
    Limit,
    TimeBucket,
    Table,
    Op,
}

impl Opt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Opt::Group => "-group",
            Opt::Int => "-int",
            Opt::StrFilter => "-str-filter",
            Opt::IntFilter => "-int-filter",
            Opt::TimeCol => "-time-col",
            Opt::Limit => "-limit",
            Opt::TimeBucket => "-time-bucket",
            Opt::Table => "-table",
            Opt::Op => "-op",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Switch(Switch),
    Opt(Opt, String),
}

/// Ordered argument list for one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    args: Vec<Arg>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a valueless flag.
    pub fn switch(mut self, flag: Switch) -> Self {
        self.args.push(Arg::Switch(flag));
        self
    }

    /// Append a flag and its value.
    pub fn opt(mut self, flag: Opt, value: impl Into<String>) -> Self {
        self.args.push(Arg::Opt(flag, value.into()));
        self
    }

    /// Append every argument of `other`, preserving order.
    pub fn extend(mut self, other: CommandArgs) -> Self {
        self.args.extend(other.args);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn contains_switch(&self, flag: Switch) -> bool {
        self.args.iter().any(|a| matches!(a, Arg::Switch(s) if *s == flag))
    }

    /// Value of the first occurrence of `flag`, if present.
    pub fn value_of(&self, flag: Opt) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            Arg::Opt(o, v) if *o == flag => Some(v.as_str()),
            _ => None,
        })
    }

    /// The argument vector handed to the process.
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() * 2);
        for arg in &self.args {
            match arg {
                Arg::Switch(s) => argv.push(s.as_str().to_string()),
                Arg::Opt(o, v) => {
                    argv.push(o.as_str().to_string());
                    argv.push(v.clone());
                }
            }
        }
        argv
    }
}

/// Shell-like rendering, for logs only.
impl fmt::Display for CommandArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in self.to_argv() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if token.is_empty() || token.contains(|c: char| c.is_whitespace() || c == '"') {
                write!(f, "\"{}\"", token.replace('"', "\\\""))?;
            } else {
                f.write_str(&token)?;
            }
        }
        Ok(())
    }
}
