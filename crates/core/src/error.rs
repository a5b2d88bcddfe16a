//! The three disjoint error taxonomies: lex/parse `ErrorCode`, fatal
//! `AbortCode`, and VM `RuntimeErrorCode`. Each gets the hand-written
//! `Display` + `std::error::Error` treatment used elsewhere in this
//! codebase for `CodeGenError` and `SerializeError`, rather than a
//! derive-macro crate.

use std::fmt;

/// Lexical and syntactic errors. Reported at a source line, counted
/// against a translation's abort threshold, and then recovered from via
/// resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unrecognizable,
    UnexpectedEof,
    InvalidNumber,
    InvalidFraction,
    InvalidExponent,
    TooManyDigits,
    RealOutOfRange,
    IntegerOutOfRange,
    MissingRightParen,
    MissingLeftParen,
    InvalidExpression,
    InvalidAssignment,
    MissingIdentifier,
    MissingEqual,
    UndefinedIdentifier,
    InvalidStatement,
    UnexpectedToken,
    MissingSemicolon,
    MissingComma,
    MissingWhile,
    InvalidConstant,
    MissingConstant,
    MissingColon,
    MissingLeftSubscript,
    MissingRightSubscript,
    RedefinedIdentifier,
    InvalidType,
    NotATypeIdentifier,
    NotAConstantIdentifier,
    IncompatibleTypes,
    InvalidTarget,
    InvalidIdentifierUsage,
    IncompatibleAssignment,
    MissingLeftBracket,
    MissingRightBracket,
    InvalidIndexType,
    MissingReturn,
    TooManySubscripts,
    InvalidField,
    NestingTooDeep,
    WrongNumberOfParms,
    InvalidReference,
    NotARecordVariable,
    MissingVariable,
    UnimplementedFeature,
    MissingSingleQuote,
    InvalidEscapeChar,
    UnterminatedString,
    LoadingLibrary,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorCode::Unrecognizable => "unrecognizable input",
            ErrorCode::UnexpectedEof => "unexpected end of file",
            ErrorCode::InvalidNumber => "invalid number",
            ErrorCode::InvalidFraction => "invalid fraction",
            ErrorCode::InvalidExponent => "invalid exponent",
            ErrorCode::TooManyDigits => "too many digits",
            ErrorCode::RealOutOfRange => "real literal out of range",
            ErrorCode::IntegerOutOfRange => "integer literal out of range",
            ErrorCode::MissingRightParen => "missing ')'",
            ErrorCode::MissingLeftParen => "missing '('",
            ErrorCode::InvalidExpression => "invalid expression",
            ErrorCode::InvalidAssignment => "invalid assignment",
            ErrorCode::MissingIdentifier => "missing identifier",
            ErrorCode::MissingEqual => "missing '='",
            ErrorCode::UndefinedIdentifier => "undefined identifier",
            ErrorCode::InvalidStatement => "invalid statement",
            ErrorCode::UnexpectedToken => "unexpected token",
            ErrorCode::MissingSemicolon => "missing ';'",
            ErrorCode::MissingComma => "missing ','",
            ErrorCode::MissingWhile => "missing 'while'",
            ErrorCode::InvalidConstant => "invalid constant",
            ErrorCode::MissingConstant => "missing constant",
            ErrorCode::MissingColon => "missing ':'",
            ErrorCode::MissingLeftSubscript => "missing '['",
            ErrorCode::MissingRightSubscript => "missing ']'",
            ErrorCode::RedefinedIdentifier => "redefined identifier",
            ErrorCode::InvalidType => "invalid type",
            ErrorCode::NotATypeIdentifier => "not a type identifier",
            ErrorCode::NotAConstantIdentifier => "not a constant identifier",
            ErrorCode::IncompatibleTypes => "incompatible types",
            ErrorCode::InvalidTarget => "invalid assignment target",
            ErrorCode::InvalidIdentifierUsage => "invalid identifier usage",
            ErrorCode::IncompatibleAssignment => "incompatible assignment",
            ErrorCode::MissingLeftBracket => "missing '{'",
            ErrorCode::MissingRightBracket => "missing '}'",
            ErrorCode::InvalidIndexType => "invalid index type",
            ErrorCode::MissingReturn => "missing return statement",
            ErrorCode::TooManySubscripts => "too many subscripts",
            ErrorCode::InvalidField => "invalid field",
            ErrorCode::NestingTooDeep => "nesting too deep",
            ErrorCode::WrongNumberOfParms => "wrong number of parameters",
            ErrorCode::InvalidReference => "invalid reference",
            ErrorCode::NotARecordVariable => "not a record variable",
            ErrorCode::MissingVariable => "missing variable",
            ErrorCode::UnimplementedFeature => "unimplemented feature",
            ErrorCode::MissingSingleQuote => "missing closing '\\''",
            ErrorCode::InvalidEscapeChar => "invalid escape character",
            ErrorCode::UnterminatedString => "unterminated string literal",
            ErrorCode::LoadingLibrary => "error loading library",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for ErrorCode {}

/// Fatal, process-terminating conditions. Each carries the negative exit
/// code the CLI driver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCode {
    InvalidCommandlineArgs,
    SourceFileOpenFailed,
    IformFileOpenFailed,
    AssemblyFileOpenFailed,
    TooManySyntaxErrors,
    StackOverflow,
    CodeSegmentOverflow,
    NestingTooDeep,
    RuntimeError,
    UnimplementedFeature,
}

impl AbortCode {
    /// The negative process exit status for this abort.
    pub fn exit_code(self) -> i32 {
        match self {
            AbortCode::InvalidCommandlineArgs => -1,
            AbortCode::SourceFileOpenFailed => -2,
            AbortCode::IformFileOpenFailed => -3,
            AbortCode::AssemblyFileOpenFailed => -4,
            AbortCode::TooManySyntaxErrors => -5,
            AbortCode::StackOverflow => -6,
            AbortCode::CodeSegmentOverflow => -7,
            AbortCode::NestingTooDeep => -8,
            AbortCode::RuntimeError => -9,
            AbortCode::UnimplementedFeature => -10,
        }
    }
}

impl fmt::Display for AbortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AbortCode::InvalidCommandlineArgs => "invalid command line arguments",
            AbortCode::SourceFileOpenFailed => "source file open failed",
            AbortCode::IformFileOpenFailed => "intermediate form file open failed",
            AbortCode::AssemblyFileOpenFailed => "assembly file open failed",
            AbortCode::TooManySyntaxErrors => "too many syntax errors",
            AbortCode::StackOverflow => "stack overflow during compilation",
            AbortCode::CodeSegmentOverflow => "code segment overflow",
            AbortCode::NestingTooDeep => "nesting too deep",
            AbortCode::RuntimeError => "runtime error",
            AbortCode::UnimplementedFeature => "unimplemented feature",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for AbortCode {}

/// Errors raised by the VM during execution. Each halts the current `Vm`
/// instance; a host may construct a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorCode {
    StackOverflow,
    ValueOutOfRange,
    InvalidCaseValue,
    DivisionByZero,
    InvalidFunctionArgument,
    InvalidUserInput,
    UnimplementedRuntimeFeature,
}

impl fmt::Display for RuntimeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RuntimeErrorCode::StackOverflow => "operand stack overflow",
            RuntimeErrorCode::ValueOutOfRange => "value out of range",
            RuntimeErrorCode::InvalidCaseValue => "invalid case value",
            RuntimeErrorCode::DivisionByZero => "division by zero",
            RuntimeErrorCode::InvalidFunctionArgument => "invalid function argument",
            RuntimeErrorCode::InvalidUserInput => "invalid user input",
            RuntimeErrorCode::UnimplementedRuntimeFeature => "unimplemented runtime feature",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for RuntimeErrorCode {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_exit_codes_are_negative_and_distinct() {
        let codes = [
            AbortCode::InvalidCommandlineArgs,
            AbortCode::SourceFileOpenFailed,
            AbortCode::IformFileOpenFailed,
            AbortCode::AssemblyFileOpenFailed,
            AbortCode::TooManySyntaxErrors,
            AbortCode::StackOverflow,
            AbortCode::CodeSegmentOverflow,
            AbortCode::NestingTooDeep,
            AbortCode::RuntimeError,
            AbortCode::UnimplementedFeature,
        ];
        let mut seen = std::collections::HashSet::new();
        for c in codes {
            assert!(c.exit_code() < 0);
            assert!(seen.insert(c.exit_code()));
        }
    }

    #[test]
    fn display_is_non_empty() {
        assert!(!ErrorCode::IncompatibleTypes.to_string().is_empty());
        assert!(!RuntimeErrorCode::DivisionByZero.to_string().is_empty());
    }
}
