// Static vocabulary for the quality gate and the generation prompt.

/// Single words that mark machine-written prose. Matched as whole words,
/// including inflections ("delves", "fostered").
pub const BANNED_WORDS: &[&str] = &[
    "delve",
    "tapestry",
    "unwavering",
    "landscape",
    "testament",
    "underscores",
    "paramount",
    "multifaceted",
    "realm",
    "passionate",
    "fostered",
    "honing",
    "meticulous",
    "moreover",
    "ignited",
    "sparked",
    "pivotal",
    "transformative",
    "profound",
    "invaluable",
    "wholeheartedly",
];

/// Clichés matched case-insensitively anywhere in the text.
pub const BANNED_PHRASES: &[&str] = &[
    "in conclusion",
    "ever since I was young",
    "from a young age",
    "this experience taught me valuable skills",
    "I am passionate about",
    "I have always been fascinated",
    "I want to make a difference",
    "it sparked my interest",
    "opened my eyes to",
    "pushed me out of my comfort zone",
    "gave me a newfound appreciation",
    "in today's fast-paced world",
    "in an ever-changing world",
    "I believe that",
    "It goes without saying",
    "needless to say",
    "at the end of the day",
];

/// Extra terms the generation prompt forbids. Not scored by the gate.
pub const PROMPT_ONLY_BANNED: &[&str] = &[
    "driven to",
    "underpinning",
    "instilled",
    "akin to",
    "demystify",
    "power of",
    "drawn to",
    "allure",
    "fascinated",
    "deeply",
    "profoundly",
    "framework",
    "utilize",
    "leverage",
];

/// Transition words that make an essay read like a list. Case-sensitive.
pub const LIST_CONNECTIVES: &[&str] = &[
    "Additionally",
    "Furthermore",
    "Moreover",
    "In addition",
    "Also,",
];

/// Evidence that the narrative includes setbacks and iteration.
pub const STRUGGLE_MARKERS: &[&str] = &[
    "failed",
    "mistake",
    "error",
    "debug",
    "struggle",
    "revised",
    "challenged",
    "difficulty",
    "problem",
    "overcame",
    "initially",
];
