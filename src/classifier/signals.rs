//! Complexity signal patterns.
//!
//! Static weighted signal data for lexical complexity scoring.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use regex::Regex;
use std::sync::LazyLock;

/// A weighted lexical complexity signal.
#[derive(Debug)]
pub struct ComplexitySignal {
    /// Stable signal name, referenced by capability descriptors.
    pub name: &'static str,
    /// The regex pattern to match.
    pub pattern: Regex,
    /// Weight added to the raw score when the signal matches.
    pub weight: f64,
    /// Human-readable description of the signal.
    #[allow(dead_code)]
    pub description: &'static str,
}

/// Static complexity signals scanned against the request text.
pub static COMPLEXITY_SIGNALS: LazyLock<Vec<ComplexitySignal>> = LazyLock::new(|| {
    vec![
        ComplexitySignal {
            name: "multi_step",
            pattern: Regex::new(
                r"(?i)\b(step[-\s]by[-\s]step|multi[-\s](step|stage|phase)|several\s+(steps|stages|phases)|plan\s+out|milestones?)\b",
            )
            .expect("static regex: multi_step"),
            weight: 1.0,
            description: "explicit multi-step structure",
        },
        ComplexitySignal {
            name: "analysis",
            pattern: Regex::new(
                r"(?i)\b(analy[sz]e|analysis|assess(ment)?|evaluate|investigate|examine|deep\s+dive)\b",
            )
            .expect("static regex: analysis"),
            weight: 1.5,
            description: "analytical treatment requested",
        },
        ComplexitySignal {
            name: "architecture",
            pattern: Regex::new(
                r"(?i)\b(architect(ure|ural|ing)?|system\s+design|redesign|refactor(ing)?|scalab(le|ility))\b",
            )
            .expect("static regex: architecture"),
            weight: 2.0,
            description: "architecture or structural design",
        },
        ComplexitySignal {
            name: "strategy",
            pattern: Regex::new(
                r"(?i)\b(strateg(y|ic|ies)|long[-\s]term|roadmap|prioriti[sz]ation|prioriti[sz]e)\b",
            )
            .expect("static regex: strategy"),
            weight: 2.0,
            description: "strategic or long-term planning",
        },
        ComplexitySignal {
            name: "integration",
            pattern: Regex::new(
                r"(?i)\b(integrat(e|ion|ing)|cross[-\s]system|interoperab(le|ility)|end[-\s]to[-\s]end)\b",
            )
            .expect("static regex: integration"),
            weight: 1.5,
            description: "cross-system integration",
        },
        ComplexitySignal {
            name: "debugging",
            pattern: Regex::new(
                r"(?i)\b(debug(ging)?|root\s+cause|diagnos(e|is|tics?)|troubleshoot(ing)?|intermittent|regression)\b",
            )
            .expect("static regex: debugging"),
            weight: 1.5,
            description: "fault diagnosis",
        },
        ComplexitySignal {
            name: "tradeoff",
            pattern: Regex::new(
                r"(?i)\b(trade[-\s]?offs?|pros\s+and\s+cons|weigh(ing)?\s+options|alternatives?)\b",
            )
            .expect("static regex: tradeoff"),
            weight: 1.0,
            description: "option weighing",
        },
        ComplexitySignal {
            name: "systemic",
            pattern: Regex::new(
                r"(?i)\b(systematic(ally)?|holistic|comprehensive|organi[sz]ation[-\s]wide|enterprise[-\s]wide|across\s+the\s+(organi[sz]ation|company|board))\b",
            )
            .expect("static regex: systemic"),
            weight: 2.5,
            description: "whole-system scope",
        },
    ]
});

/// Continuation phrases; they count only when session context exists.
pub static CONTINUITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(continu(e|ing)|follow[-\s]?up|as\s+(before|last\s+time)|previous(ly)?|earlier|again)\b",
    )
    .expect("static regex: continuity")
});

/// Name of the context-dependent continuity signal.
pub const CONTINUITY_SIGNAL: &str = "continuity";

/// Weight of the continuity signal.
pub const CONTINUITY_WEIGHT: f64 = 0.5;
