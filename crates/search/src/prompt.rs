//! Prompt content and assembly.
//!
//! Assembly is a pure function of a [`PromptContext`]; nothing here talks to
//! the generator or the store.

use policyforge_store::HistoricalCandidate;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Mechanisms a policy may combine within the metadata budget.
pub const SEED_KNOWLEDGE: &str = "\
You can compose policies from these compact mechanisms that fit <=64 KiB metadata:
- RRIP/DRRIP: 2-bit RRPV; SRRIP vs BRRIP with set-dueling and a 10-bit PSEL selector.
- DIP-style insertion depth control: choose between LIP/BIP using 32-64 leader sets.
- SHiP-lite: 4-6 bit PC signatures with 2-bit outcome counters to bias insertion depth.
- Streaming detector: detect near-monotonic address deltas; bypass or insert at distant RRPV.
- Dead-block approximation: tiny per-line reuse counters, periodic decay.
Keep the total metadata <= 64 KiB across all structures. Prefer small saturating counters.";

/// Skeleton every generated policy must fill in.
pub const CODE_TEMPLATE: &str = r#"```cpp
#include <vector>
#include <cstdint>
#include <iostream>
#include "../inc/champsim_crc2.h"

#define NUM_CORE 1
#define LLC_SETS (NUM_CORE * 2048)
#define LLC_WAYS 16

// Initialize replacement state
void InitReplacementState() {
}

// Find victim in the set
uint32_t GetVictimInSet(
    uint32_t cpu,
    uint32_t set,
    const BLOCK *current_set,
    uint64_t PC,
    uint64_t paddr,
    uint32_t type
) {
    return 0;
}

// Update replacement state
void UpdateReplacementState(
    uint32_t cpu,
    uint32_t set,
    uint32_t way,
    uint64_t paddr,
    uint64_t PC,
    uint64_t victim_addr,
    uint32_t type,
    uint8_t hit
) {
}

// Print end-of-simulation statistics
void PrintStats() {
}

// Print periodic (heartbeat) statistics
void PrintStats_Heartbeat() {
}
```"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Explore,
    Refine,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptFocus {
    /// First round: seeded with the best historical candidates.
    Explore { history: Vec<HistoricalCandidate> },
    /// Later rounds: improve on the previously chosen design.
    Refine {
        name: String,
        description: String,
        source: String,
        feedback: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    /// Combined description of the benchmark items.
    pub benchmark_description: String,
    pub benchmark_names: Vec<String>,
    pub focus: PromptFocus,
}

impl PromptContext {
    pub fn kind(&self) -> PromptKind {
        match self.focus {
            PromptFocus::Explore { .. } => PromptKind::Explore,
            PromptFocus::Refine { .. } => PromptKind::Refine,
        }
    }

    pub fn assemble(&self) -> String {
        match &self.focus {
            PromptFocus::Explore { history } => self.explore(history),
            PromptFocus::Refine {
                name,
                description,
                source,
                feedback,
            } => self.refine(name, description, source, feedback),
        }
    }

    fn header(&self) -> String {
        format!(
            "The following workloads are under consideration:\n{}\n\n",
            self.benchmark_description
        )
    }

    fn explore(&self, history: &[HistoricalCandidate]) -> String {
        let mut prompt = self.header();
        prompt.push_str("The top-performing cache replacement policies from past experiments are:\n");
        prompt.push_str(&format_history(history));
        prompt.push_str("\n\n");
        prompt.push_str(
            "Design goal: Propose a new cache replacement policy that outperforms the above across these workloads.\n\
             Constraints: Implementation must compile inside the provided template and keep total metadata <= 64 KiB.\n\n\
             Diversity requirements (generate distinct ideas):\n\
             - Vary reuse prediction source (recency vs PC/signature vs address bits).\n\
             - Vary insertion depth (e.g., DIP/DRRIP-like) and protection strategy.\n\
             - Consider a streaming/scan detector to avoid polluting working sets.\n\n",
        );
        let _ = write!(prompt, "Seed mechanisms you may combine:\n{SEED_KNOWLEDGE}\n\n");
        let _ = write!(
            prompt,
            "Think briefly before coding (2-3 bullets), then commit to ONE design:\n\
             1) List three candidate mechanisms and the specific workloads they help ({}).\n\
             2) Choose the best one, explaining why it dominates on average.\n\
             3) Provide a complete C++ implementation that compiles with the given template.\n\n",
            self.benchmark_names.join(", ")
        );
        prompt.push_str(&output_format(
            "one paragraph describing the approach and why it helps",
        ));
        prompt
    }

    fn refine(&self, name: &str, description: &str, source: &str, feedback: &str) -> String {
        let mut prompt = self.header();
        let _ = write!(
            prompt,
            "Your previous design was **{name}**:\n\n\
             Description:\n{description}\n\n\
             Implementation:\n```cpp\n{source}\n```\n\n\
             Feedback from the last run:\n{feedback}\n\n"
        );
        prompt.push_str(
            "Task: Refine or redesign the policy to achieve better performance across all workloads.\n\
             Diversity requirements: change at least ONE of (prediction source, insertion depth policy, \
             streaming/bypass logic, metadata layout).\n\n",
        );
        let _ = write!(prompt, "Seed mechanisms you may combine:\n{SEED_KNOWLEDGE}\n\n");
        prompt.push_str("Think briefly before coding (2-3 bullets), then commit to ONE design.\n");
        prompt.push_str(&output_format(
            "one paragraph explaining the approach and why it improves performance",
        ));
        prompt
    }
}

fn output_format(description_hint: &str) -> String {
    format!(
        "Use the exact output format below:\n\n\
         ## Policy Name\n<name>\n\n\
         ## Policy Description\n<{description_hint}>\n\n\
         ## C++ Implementation\n{CODE_TEMPLATE}\n"
    )
}

pub fn format_history(history: &[HistoricalCandidate]) -> String {
    if history.is_empty() {
        return "(no prior experiments recorded)".to_string();
    }
    history
        .iter()
        .map(|c| {
            format!(
                "Policy: {}\nScore: {:.4}\nDescription:\n{}\n",
                c.policy_name, c.score, c.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(focus: PromptFocus) -> PromptContext {
        PromptContext {
            benchmark_description: "- mcf: pointer chasing\n- lbm: streaming".into(),
            benchmark_names: vec!["mcf".into(), "lbm".into()],
            focus,
        }
    }

    #[test]
    fn test_explore_prompt_includes_history_and_catalogue() {
        let ctx = context(PromptFocus::Explore {
            history: vec![HistoricalCandidate {
                policy_name: "ship_drrip".into(),
                score: 0.91234,
                description: "SHiP with DRRIP dueling".into(),
            }],
        });
        let prompt = ctx.assemble();
        assert_eq!(ctx.kind(), PromptKind::Explore);
        assert!(prompt.starts_with("The following workloads are under consideration:\n- mcf"));
        assert!(prompt.contains("Policy: ship_drrip\nScore: 0.9123\n"));
        assert!(prompt.contains(SEED_KNOWLEDGE));
        assert!(prompt.contains("the specific workloads they help (mcf, lbm)"));
        assert!(prompt.contains("uint32_t GetVictimInSet("));
    }

    #[test]
    fn test_explore_prompt_without_history() {
        let prompt = context(PromptFocus::Explore { history: vec![] }).assemble();
        assert!(prompt.contains("(no prior experiments recorded)"));
    }

    #[test]
    fn test_refine_prompt_carries_previous_design_and_feedback() {
        let ctx = context(PromptFocus::Refine {
            name: "Dead Block Bypass".into(),
            description: "Bypasses dead lines.".into(),
            source: "int x;".into(),
            feedback: "Try a materially different mechanism.".into(),
        });
        let prompt = ctx.assemble();
        assert_eq!(ctx.kind(), PromptKind::Refine);
        assert!(prompt.contains("Your previous design was **Dead Block Bypass**"));
        assert!(prompt.contains("```cpp\nint x;\n```"));
        assert!(prompt.contains("Feedback from the last run:\nTry a materially different mechanism."));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let ctx = context(PromptFocus::Explore { history: vec![] });
        assert_eq!(ctx.assemble(), ctx.assemble());
    }
}
