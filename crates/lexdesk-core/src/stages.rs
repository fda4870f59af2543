use serde::Serialize;

/// Final stage index; reached at 75% and held through completion.
pub const FINAL_STAGE: u8 = 4;

/// A named processing phase. Used only to label `current_stage` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub id: u8,
    pub name: &'static str,
    pub description: &'static str,
}

const STAGES: [Stage; 4] = [
    Stage {
        id: 1,
        name: "AI Pre-Processor",
        description: "OCR, text extraction, segmentation",
    },
    Stage {
        id: 2,
        name: "Summary & Risk",
        description: "Plain-language summary, obligations, risks",
    },
    Stage {
        id: 3,
        name: "Q&A Chatbot",
        description: "Semantic search, contextual answers",
    },
    Stage {
        id: 4,
        name: "Final Display",
        description: "Summaries, visualizations, chat",
    },
];

pub fn all_stages() -> &'static [Stage] {
    &STAGES
}

pub fn get_stage(id: u8) -> Option<&'static Stage> {
    STAGES.iter().find(|s| s.id == id)
}

/// Stage reported by a non-terminal tick at the given progress.
pub fn stage_for_progress(progress: f64) -> u8 {
    if progress > 75.0 {
        4
    } else if progress > 50.0 {
        3
    } else if progress > 25.0 {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_four_ordered_stages() {
        let ids: Vec<u8> = all_stages().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(get_stage(2).map(|s| s.name), Some("Summary & Risk"));
        assert!(get_stage(0).is_none());
        assert!(get_stage(5).is_none());
    }

    #[test]
    fn thresholds_are_upper_inclusive() {
        assert_eq!(stage_for_progress(0.0), 1);
        assert_eq!(stage_for_progress(25.0), 1);
        assert_eq!(stage_for_progress(25.01), 2);
        assert_eq!(stage_for_progress(50.0), 2);
        assert_eq!(stage_for_progress(50.5), 3);
        assert_eq!(stage_for_progress(75.0), 3);
        assert_eq!(stage_for_progress(75.1), 4);
        assert_eq!(stage_for_progress(99.9), FINAL_STAGE);
    }

    #[test]
    fn stage_never_decreases_with_progress() {
        let mut last = 0;
        for step in 0..=1000 {
            let stage = stage_for_progress(step as f64 / 10.0);
            assert!(stage >= last);
            last = stage;
        }
    }
}
