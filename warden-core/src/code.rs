//! Verification code generation.

use rand::Rng;

pub const DEFAULT_CODE_LENGTH: usize = 6;
pub const DEFAULT_TEST_CODE: &str = "123456";

pub trait CodeGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

/// Always returns the same code. Used outside production so testers can log in
/// without a real SMS or mailbox.
#[derive(Debug, Clone)]
pub struct FixedCodeGenerator {
    code: String,
}

impl FixedCodeGenerator {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl Default for FixedCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TEST_CODE)
    }
}

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self) -> String {
        self.code.clone()
    }
}

/// Uniformly random, zero-padded numeric codes of a fixed width.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    /// Width is clamped to 1..=9 digits so the code always fits a `u32`.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(1, 9),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let upper = 10u32.pow(self.length as u32);
        let value = rand::rng().random_range(0..upper);
        format!("{value:0width$}", width = self.length)
    }
}

/// How codes are produced, chosen by environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeMode {
    /// Non-production: every issuance yields this code.
    Fixed(String),
    /// Production: random codes of the given width.
    Random { length: usize },
}

impl Default for CodeMode {
    fn default() -> Self {
        CodeMode::Random {
            length: DEFAULT_CODE_LENGTH,
        }
    }
}

impl CodeMode {
    pub fn test() -> Self {
        CodeMode::Fixed(DEFAULT_TEST_CODE.to_string())
    }

    pub fn generator(&self) -> Box<dyn CodeGenerator> {
        match self {
            CodeMode::Fixed(code) => Box::new(FixedCodeGenerator::new(code.clone())),
            CodeMode::Random { length } => Box::new(RandomCodeGenerator::new(*length)),
        }
    }
}
