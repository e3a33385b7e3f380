//! Console grammar expressed as static data.
//!
//! The parser, the completion engine and `help` all read the same tables, so
//! keywords, defaults and value layouts cannot drift apart.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    PowerInfo,
    PowerInDebug,
    S5Timeout,
    Shutdown,
    Reset,
    PowerOn,
    Lid,
    PowerBtn,
    SigLog,
    Sysjump,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceTag {
    DebugMask,
    S5Seconds,
    S5Never,
    LidOpen,
    LidClose,
    Press,
    PressFor,
    Pulse,
    PulseOn,
    PulseOff,
    SigLogClear,
}

/// Argument layout following a keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSpec {
    None,
    /// `<n>ms` or `<n>s`.
    Duration,
    /// Decimal integer.
    Integer,
    /// Hex (`0x..`) or decimal bitmask.
    Mask,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub usage: &'static str,
    pub summary: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    /// One of `choices`; anything else falls through to `default`.
    OptionalChoice {
        choices: &'static [ChoiceBranch],
        default: Option<DefaultChoice>,
    },
    /// A bare value; the line may also end here.
    OptionalValue {
        tag: ChoiceTag,
        value: ValueSpec,
        next: &'static Node,
    },
    /// A command name to describe.
    Topic { next: &'static Node },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChoiceBranch {
    pub keyword: &'static str,
    pub tag: ChoiceTag,
    pub value: ValueSpec,
    pub next: &'static Node,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DefaultChoice {
    pub tag: ChoiceTag,
    pub next: &'static Node,
}

const END: Node = Node::End;

const DEBUG_GRAMMAR: Node = Node::OptionalValue {
    tag: ChoiceTag::DebugMask,
    value: ValueSpec::Mask,
    next: &END,
};

const S5_CHOICES: [ChoiceBranch; 1] = [ChoiceBranch {
    keyword: "never",
    tag: ChoiceTag::S5Never,
    value: ValueSpec::None,
    next: &END,
}];

const S5_SECONDS: Node = Node::OptionalValue {
    tag: ChoiceTag::S5Seconds,
    value: ValueSpec::Integer,
    next: &END,
};

const S5_GRAMMAR: Node = Node::OptionalChoice {
    choices: &S5_CHOICES,
    default: Some(DefaultChoice {
        tag: ChoiceTag::S5Seconds,
        next: &S5_SECONDS,
    }),
};

const LID_CHOICES: [ChoiceBranch; 2] = [
    ChoiceBranch {
        keyword: "open",
        tag: ChoiceTag::LidOpen,
        value: ValueSpec::None,
        next: &END,
    },
    ChoiceBranch {
        keyword: "close",
        tag: ChoiceTag::LidClose,
        value: ValueSpec::None,
        next: &END,
    },
];

const LID_GRAMMAR: Node = Node::OptionalChoice {
    choices: &LID_CHOICES,
    default: None,
};

const PRESS_DURATION: Node = Node::OptionalValue {
    tag: ChoiceTag::PressFor,
    value: ValueSpec::Duration,
    next: &END,
};

const PULSE_CHOICES: [ChoiceBranch; 2] = [
    ChoiceBranch {
        keyword: "on",
        tag: ChoiceTag::PulseOn,
        value: ValueSpec::None,
        next: &END,
    },
    ChoiceBranch {
        keyword: "off",
        tag: ChoiceTag::PulseOff,
        value: ValueSpec::None,
        next: &END,
    },
];

const PULSE_GRAMMAR: Node = Node::OptionalChoice {
    choices: &PULSE_CHOICES,
    default: None,
};

const POWERBTN_CHOICES: [ChoiceBranch; 2] = [
    ChoiceBranch {
        keyword: "press",
        tag: ChoiceTag::Press,
        value: ValueSpec::None,
        next: &PRESS_DURATION,
    },
    ChoiceBranch {
        keyword: "pulse",
        tag: ChoiceTag::Pulse,
        value: ValueSpec::None,
        next: &PULSE_GRAMMAR,
    },
];

const POWERBTN_GRAMMAR: Node = Node::OptionalChoice {
    choices: &POWERBTN_CHOICES,
    default: Some(DefaultChoice {
        tag: ChoiceTag::Press,
        next: &PRESS_DURATION,
    }),
};

const SIGLOG_CHOICES: [ChoiceBranch; 1] = [ChoiceBranch {
    keyword: "clear",
    tag: ChoiceTag::SigLogClear,
    value: ValueSpec::None,
    next: &END,
}];

const SIGLOG_GRAMMAR: Node = Node::OptionalChoice {
    choices: &SIGLOG_CHOICES,
    default: None,
};

const HELP_GRAMMAR: Node = Node::Topic { next: &END };

const COMMANDS: [CommandSpec; 11] = [
    CommandSpec {
        name: "powerinfo",
        tag: CommandTag::PowerInfo,
        grammar: &END,
        usage: "powerinfo",
        summary: "show the chipset power state and inputs",
    },
    CommandSpec {
        name: "powerindebug",
        tag: CommandTag::PowerInDebug,
        grammar: &DEBUG_GRAMMAR,
        usage: "powerindebug [mask]",
        summary: "show or set which input changes are logged",
    },
    CommandSpec {
        name: "s5timeout",
        tag: CommandTag::S5Timeout,
        grammar: &S5_GRAMMAR,
        usage: "s5timeout [seconds|never]",
        summary: "show or set the S5 inactivity timeout",
    },
    CommandSpec {
        name: "shutdown",
        tag: CommandTag::Shutdown,
        grammar: &END,
        usage: "shutdown",
        summary: "force the chipset off",
    },
    CommandSpec {
        name: "reset",
        tag: CommandTag::Reset,
        grammar: &END,
        usage: "reset",
        summary: "cold reset the AP",
    },
    CommandSpec {
        name: "poweron",
        tag: CommandTag::PowerOn,
        grammar: &END,
        usage: "poweron",
        summary: "boot from an off state",
    },
    CommandSpec {
        name: "lid",
        tag: CommandTag::Lid,
        grammar: &LID_GRAMMAR,
        usage: "lid open|close",
        summary: "simulate the lid switch",
    },
    CommandSpec {
        name: "powerbtn",
        tag: CommandTag::PowerBtn,
        grammar: &POWERBTN_GRAMMAR,
        usage: "powerbtn [press <duration>|pulse [on|off]]",
        summary: "simulate a power-button press or set pulse mode",
    },
    CommandSpec {
        name: "siglog",
        tag: CommandTag::SigLog,
        grammar: &SIGLOG_GRAMMAR,
        usage: "siglog [clear]",
        summary: "show or clear the power event log",
    },
    CommandSpec {
        name: "sysjump",
        tag: CommandTag::Sysjump,
        grammar: &END,
        usage: "sysjump",
        summary: "warm-restart the controller keeping the chipset up",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        usage: "help [command]",
        summary: "show help for a command",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Finds a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|command| command.tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_has_exactly_one_entry() {
        for spec in commands() {
            assert_eq!(command(spec.tag), Some(spec));
            assert!(spec.usage.starts_with(spec.name));
        }
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find("PowerInfo").map(|spec| spec.tag), Some(CommandTag::PowerInfo));
        assert!(find("reboot").is_none());
    }
}
