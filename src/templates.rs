pub const CMA_REASONING_PROMPT_MD: &str = include_str!("../prompts/cma_reasoning.md");
pub const VISION_EXTRACTION_PROMPT_MD: &str = include_str!("../prompts/vision_extraction.md");
pub const FEASIBILITY_REASONING_PROMPT_MD: &str =
    include_str!("../prompts/feasibility_reasoning.md");
pub const DD_JOB_PROMPT_MD: &str = include_str!("../prompts/dd_job.md");
pub const RENO_INTERVIEW_PROMPT_MD: &str = include_str!("../prompts/reno_interview.md");
pub const DD_CHECKLIST_JSON: &str = include_str!("../templates/dd_checklist.json");
pub const STORES_JSON: &str = include_str!("../templates/stores.json");
