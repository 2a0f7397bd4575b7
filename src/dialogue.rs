//! Weighted dialogue bank.
//!
//! Line lookup by category, optionally narrowed by topic. Banks are
//! plain JSON so stations can ship their own; a built-in default bank
//! keeps the simulator usable out of the box. A missing category never
//! stalls the show — the state machine degrades to `fallback_line`.

use crate::sources::{DialogueLine, DialogueSource, LineCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One candidate line in the bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankLine {
    pub text: String,
    /// Relative pick weight; higher is more likely.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// When set, this line is preferred while the named topic is on air.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

fn default_weight() -> u32 {
    1
}

fn default_host() -> String {
    "Host".to_string()
}

/// A loadable collection of host lines keyed by category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueBank {
    #[serde(default = "default_host")]
    pub host_name: String,
    #[serde(default)]
    pub lines: HashMap<LineCategory, Vec<BankLine>>,
}

impl DialogueBank {
    /// Load a bank from JSON.
    pub fn load(path: &Path) -> Result<Self, String> {
        let data = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read dialogue bank '{}': {}", path.display(), e))?;
        serde_json::from_str(&data)
            .map_err(|e| format!("Corrupt dialogue bank '{}': {}", path.display(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Serialize error: {}", e))?;
        fs::write(path, json)
            .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))
    }

    /// The built-in bank used when no file is configured.
    pub fn default_bank() -> Self {
        let mut lines: HashMap<LineCategory, Vec<BankLine>> = HashMap::new();
        let mut add = |cat: LineCategory, texts: &[&str]| {
            lines.insert(
                cat,
                texts
                    .iter()
                    .map(|t| BankLine {
                        text: t.to_string(),
                        weight: 1,
                        topic: None,
                    })
                    .collect(),
            );
        };
        add(
            LineCategory::Opening,
            &[
                "Good evening, night owls — you're live on the graveyard shift, and the phone lines are open.",
                "You're tuned in, the coffee's hot, and we are on the air. Let's hear what's out there tonight.",
            ],
        );
        add(
            LineCategory::Closing,
            &[
                "That's all the night we have. Lock your doors, be kind to each other, and I'll see you on the other side.",
                "The clock says we're done. Thanks for riding along — this has been the show, and you have been the listeners.",
            ],
        );
        add(
            LineCategory::BetweenCallers,
            &[
                "Alright, let's see who else is holding for us tonight.",
                "Plenty more lines lit up — don't go anywhere.",
            ],
        );
        add(
            LineCategory::DeadAirFiller,
            &[
                "The board's gone quiet, which around here usually means something's about to happen.",
                "If you're just joining us: the lines are open, and the night is young. Give us a ring.",
                "Nothing but the hum of the transmitter and me. Perfect time to call in.",
            ],
        );
        add(
            LineCategory::BreakTransition,
            &[
                "Hold that thought — we have to pay the electric bill. Back right after this.",
                "Don't touch that dial, a quick word from our sponsors and we're right back.",
            ],
        );
        add(
            LineCategory::ReturnFromBreak,
            &[
                "And we're back. You're still with the graveyard shift.",
                "Welcome back — the lines stayed lit the whole break, so let's get to it.",
            ],
        );
        add(
            LineCategory::OffTopicRemark,
            &[
                "Folks, a gentle reminder: we do have a topic tonight, and that... was not it.",
                "I admire the enthusiasm, but let's steer this bus back onto the road.",
            ],
        );
        add(
            LineCategory::DroppedCaller,
            &[
                "Aaand we lost them. Happens to the best of us — next caller, you're up.",
                "That line went dead mid-sentence. If you're still out there, call us back.",
            ],
        );
        add(
            LineCategory::CallerCursed,
            &[
                "Whoa — this is a family frequency! Apologies to your ears, folks.",
                "And that is why we have the delay button. Moving swiftly on.",
            ],
        );
        DialogueBank {
            host_name: default_host(),
            lines,
        }
    }

    /// Weighted random pick from a category. Lines tagged with the
    /// current topic win over untagged lines when any match.
    fn pick(&self, category: LineCategory, topic: Option<&str>) -> Option<&BankLine> {
        let candidates = self.lines.get(&category)?;
        if candidates.is_empty() {
            return None;
        }
        let pool: Vec<&BankLine> = match topic {
            Some(t) => {
                let matching: Vec<&BankLine> = candidates
                    .iter()
                    .filter(|l| l.topic.as_deref() == Some(t))
                    .collect();
                if matching.is_empty() {
                    candidates.iter().filter(|l| l.topic.is_none()).collect()
                } else {
                    matching
                }
            }
            None => candidates.iter().filter(|l| l.topic.is_none()).collect(),
        };
        let pool = if pool.is_empty() {
            candidates.iter().collect()
        } else {
            pool
        };
        let total: u32 = pool.iter().map(|l| l.weight.max(1)).sum();
        let mut roll = fastrand::u32(0..total);
        for line in &pool {
            let w = line.weight.max(1);
            if roll < w {
                return Some(line);
            }
            roll -= w;
        }
        pool.last().copied()
    }
}

impl Default for DialogueBank {
    fn default() -> Self {
        Self::default_bank()
    }
}

impl DialogueSource for DialogueBank {
    fn line(&self, category: LineCategory, topic: Option<&str>) -> Option<DialogueLine> {
        self.pick(category, topic).map(|l| DialogueLine {
            speaker: self.host_name.clone(),
            text: l.text.clone(),
            duration_secs: speak_secs(&l.text),
        })
    }
}

/// Rough on-air duration for a line of text, clamped to sane bounds.
pub fn speak_secs(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (0.35 * words + 0.8).clamp(1.0, 12.0)
}

/// Degraded line used when a category has no content. Missing material
/// never takes the show off the air.
pub fn fallback_line(category: LineCategory) -> DialogueLine {
    let text = match category {
        LineCategory::Opening => "Welcome to the show.",
        LineCategory::Closing => "That's our show. Good night.",
        LineCategory::BetweenCallers => "Let's take the next caller.",
        LineCategory::DeadAirFiller => "You're listening to the show.",
        LineCategory::BreakTransition => "We'll be right back.",
        LineCategory::ReturnFromBreak => "We're back.",
        LineCategory::OffTopicRemark => "Let's stay on topic, folks.",
        LineCategory::DroppedCaller => "Looks like we lost that caller.",
        LineCategory::CallerCursed => "Apologies for that language, folks.",
    };
    DialogueLine {
        speaker: default_host(),
        text: text.to_string(),
        duration_secs: 3.0,
    }
}
