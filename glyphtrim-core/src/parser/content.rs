//! PDF Content Stream Parser
//!
//! Tokenizes page drawing programs and reduces them to the operators that
//! matter for glyph usage: font selection, text showing, graphics state
//! save/restore and XObject painting. Every other operator is kept as
//! [`ContentOperation::Other`] so callers can still count it.
//!
//! Operand errors are local: an operator whose operands have the wrong
//! count or type is dropped and parsing resumes with the next operator.

use super::{ParseError, ParseResult};
use tracing::warn;

/// A drawing-program operator relevant to glyph usage
#[derive(Debug, Clone, PartialEq)]
pub enum ContentOperation {
    // Text object operators
    BeginText, // BT
    EndText,   // ET

    // Text state operators
    SetFont(String, f32), // Tf

    // Text showing operators
    ShowText(Vec<u8>),                             // Tj
    ShowTextArray(Vec<TextElement>),               // TJ
    NextLineShowText(Vec<u8>),                     // '
    SetSpacingNextLineShowText(f32, f32, Vec<u8>), // "

    // Graphics state operators
    SaveGraphicsState,    // q
    RestoreGraphicsState, // Q

    // XObject operators
    PaintXObject(String), // Do

    // Inline image (BI ... ID ... EI), data skipped
    InlineImage,

    /// Any other operator; operands are discarded
    Other(String),
}

/// Represents a text element in a TJ array
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    Text(Vec<u8>),
    Spacing(f32),
}

/// Token types in content streams
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f32),
    Integer(i32),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Name(String),
    Operator(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    /// Bytes skipped after a tokenizer error; discards pending operands
    Invalid,
}

/// Content stream tokenizer
pub struct ContentTokenizer<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> ContentTokenizer<'a> {
    /// Create a new tokenizer for the given input
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    /// Current byte offset into the input
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the next token from the stream
    pub(crate) fn next_token(&mut self) -> ParseResult<Option<Token>> {
        self.skip_whitespace();

        if self.position >= self.input.len() {
            return Ok(None);
        }

        let ch = self.input[self.position];

        match ch {
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),

            b'(' => self.read_literal_string(),
            b'<' => {
                if self.peek_next() == Some(b'<') {
                    self.position += 2;
                    Ok(Some(Token::DictStart))
                } else {
                    self.read_hex_string()
                }
            }
            b'>' => {
                if self.peek_next() == Some(b'>') {
                    self.position += 2;
                    Ok(Some(Token::DictEnd))
                } else {
                    Err(ParseError::SyntaxError {
                        position: self.position,
                        message: "Unexpected '>'".to_string(),
                    })
                }
            }

            b'[' => {
                self.position += 1;
                Ok(Some(Token::ArrayStart))
            }
            b']' => {
                self.position += 1;
                Ok(Some(Token::ArrayEnd))
            }

            b'/' => self.read_name(),

            b')' | b'{' | b'}' => {
                // Stray delimiters are tolerated as one-byte operators
                self.position += 1;
                Ok(Some(Token::Operator((ch as char).to_string())))
            }

            _ => {
                let token = self.read_operator()?;
                if let Some(Token::Operator(op)) = &token {
                    if op == "ID" {
                        self.skip_inline_image_data();
                    }
                }
                Ok(token)
            }
        }
    }

    /// Step over the bytes that made `next_token` fail
    pub(crate) fn recover(&mut self) {
        if self.position >= self.input.len() {
            return;
        }
        let stray_close = self.input[self.position] == b'>';
        self.position += 1;
        if stray_close {
            return;
        }
        // Rest of a broken hex string, up to and including its '>'
        while self.position < self.input.len() && !is_delimiter(self.input[self.position]) {
            self.position += 1;
        }
        if self.input.get(self.position) == Some(&b'>') {
            self.position += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() {
            match self.input[self.position] {
                b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0' => self.position += 1,
                b'%' => self.skip_comment(),
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while self.position < self.input.len()
            && self.input[self.position] != b'\n'
            && self.input[self.position] != b'\r'
        {
            self.position += 1;
        }
    }

    fn peek_next(&self) -> Option<u8> {
        self.input.get(self.position + 1).copied()
    }

    /// Skip binary inline image data up to and including the `EI` operator.
    fn skip_inline_image_data(&mut self) {
        // A single whitespace byte follows ID
        self.position += 1;
        while self.position + 1 < self.input.len() {
            let at_ei = self.input[self.position] == b'E'
                && self.input[self.position + 1] == b'I'
                && self.position > 0
                && is_whitespace(self.input[self.position - 1])
                && self
                    .input
                    .get(self.position + 2)
                    .map_or(true, |&b| is_whitespace(b));
            if at_ei {
                // Leave "EI" to be tokenized as the closing operator
                return;
            }
            self.position += 1;
        }
        self.position = self.input.len();
    }

    fn read_number(&mut self) -> ParseResult<Option<Token>> {
        let start = self.position;
        let mut has_dot = false;

        if self.position < self.input.len()
            && (self.input[self.position] == b'+' || self.input[self.position] == b'-')
        {
            self.position += 1;
        }

        while self.position < self.input.len() {
            match self.input[self.position] {
                b'0'..=b'9' => self.position += 1,
                b'.' if !has_dot => {
                    has_dot = true;
                    self.position += 1;
                }
                _ => break,
            }
        }

        let num_str = std::str::from_utf8(&self.input[start..self.position]).map_err(|_| {
            ParseError::SyntaxError {
                position: start,
                message: "Invalid number format".to_string(),
            }
        })?;

        // A lone sign or dot reads as zero, like most viewers do
        if matches!(num_str, "+" | "-" | "." | "+." | "-.") {
            return Ok(Some(Token::Integer(0)));
        }

        if !has_dot {
            if let Ok(value) = num_str.parse::<i32>() {
                return Ok(Some(Token::Integer(value)));
            }
        }

        let value = num_str
            .parse::<f32>()
            .map_err(|_| ParseError::SyntaxError {
                position: start,
                message: format!("Invalid number: {num_str}"),
            })?;
        Ok(Some(Token::Number(value)))
    }

    fn read_literal_string(&mut self) -> ParseResult<Option<Token>> {
        self.position += 1; // Skip opening '('
        let mut result = Vec::new();
        let mut paren_depth = 1;
        let mut escape = false;

        while self.position < self.input.len() && paren_depth > 0 {
            let ch = self.input[self.position];
            self.position += 1;

            if escape {
                match ch {
                    b'n' => result.push(b'\n'),
                    b'r' => result.push(b'\r'),
                    b't' => result.push(b'\t'),
                    b'b' => result.push(b'\x08'),
                    b'f' => result.push(b'\x0C'),
                    b'(' => result.push(b'('),
                    b')' => result.push(b')'),
                    b'\\' => result.push(b'\\'),
                    b'\r' => {
                        // Line continuation, swallow an optional LF
                        if self.input.get(self.position) == Some(&b'\n') {
                            self.position += 1;
                        }
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        self.position -= 1;
                        result.push(self.read_octal_escape());
                    }
                    _ => result.push(ch),
                }
                escape = false;
            } else {
                match ch {
                    b'\\' => escape = true,
                    b'(' => {
                        paren_depth += 1;
                        result.push(ch);
                    }
                    b')' => {
                        paren_depth -= 1;
                        if paren_depth > 0 {
                            result.push(ch);
                        }
                    }
                    _ => result.push(ch),
                }
            }
        }

        Ok(Some(Token::String(result)))
    }

    fn read_octal_escape(&mut self) -> u8 {
        let mut value = 0u16;
        let mut count = 0;

        while count < 3 && self.position < self.input.len() {
            match self.input[self.position] {
                b'0'..=b'7' => {
                    value = value * 8 + (self.input[self.position] - b'0') as u16;
                    self.position += 1;
                    count += 1;
                }
                _ => break,
            }
        }

        (value & 0xFF) as u8
    }

    fn read_hex_string(&mut self) -> ParseResult<Option<Token>> {
        self.position += 1; // Skip opening '<'
        let mut result = Vec::new();
        let mut nibble = None;

        while self.position < self.input.len() {
            let ch = self.input[self.position];

            match ch {
                b'>' => {
                    self.position += 1;
                    // Odd digit count: the last digit is padded with 0
                    if let Some(n) = nibble {
                        result.push(n << 4);
                    }
                    return Ok(Some(Token::HexString(result)));
                }
                b'0'..=b'9' | b'A'..=b'F' | b'a'..=b'f' => {
                    let digit = hex_digit(ch);
                    if let Some(n) = nibble {
                        result.push((n << 4) | digit);
                        nibble = None;
                    } else {
                        nibble = Some(digit);
                    }
                    self.position += 1;
                }
                b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' => {
                    self.position += 1;
                }
                _ => {
                    return Err(ParseError::SyntaxError {
                        position: self.position,
                        message: format!("Invalid character in hex string: {:?}", ch as char),
                    });
                }
            }
        }

        Err(ParseError::SyntaxError {
            position: self.position,
            message: "Unterminated hex string".to_string(),
        })
    }

    fn read_name(&mut self) -> ParseResult<Option<Token>> {
        self.position += 1; // Skip '/'
        let start = self.position;

        while self.position < self.input.len() && !is_delimiter(self.input[self.position]) {
            self.position += 1;
        }

        let name = decode_name(&self.input[start..self.position]);
        Ok(Some(Token::Name(name)))
    }

    fn read_operator(&mut self) -> ParseResult<Option<Token>> {
        let start = self.position;

        while self.position < self.input.len() && !is_delimiter(self.input[self.position]) {
            self.position += 1;
        }

        let op_bytes = &self.input[start..self.position];
        let op = String::from_utf8_lossy(op_bytes).into_owned();

        Ok(Some(Token::Operator(op)))
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    is_whitespace(b)
        || matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
}

fn hex_digit(ch: u8) -> u8 {
    match ch {
        b'0'..=b'9' => ch - b'0',
        b'A'..=b'F' => ch - b'A' + 10,
        _ => ch - b'a' + 10,
    }
}

/// Decode `#xx` escapes in a name; malformed escapes are kept literally.
fn decode_name(bytes: &[u8]) -> String {
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'#'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            result.push((hex_digit(bytes[i + 1]) << 4) | hex_digit(bytes[i + 2]));
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&result).into_owned()
}

/// Content stream parser
pub struct ContentParser {
    tokens: Vec<Token>,
    position: usize,
    skipped: usize,
}

impl ContentParser {
    /// Parse a content stream into operations.
    ///
    /// Fails only when the byte stream cannot be tokenized at all; operand
    /// problems are skipped per operator.
    pub fn parse(content: &[u8]) -> ParseResult<Vec<ContentOperation>> {
        let mut tokenizer = ContentTokenizer::new(content);
        let mut tokens = Vec::new();

        while let Some(token) = tokenizer.next_token()? {
            tokens.push(token);
        }

        Ok(Self::from_tokens(tokens).parse_operators())
    }

    /// Parse a content stream, stepping over bytes that cannot be tokenized.
    ///
    /// The operator consuming a broken token is skipped; everything after
    /// it is still returned.
    pub fn parse_lenient(content: &[u8]) -> Vec<ContentOperation> {
        let mut tokenizer = ContentTokenizer::new(content);
        let mut tokens = Vec::new();

        loop {
            match tokenizer.next_token() {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable content stream bytes");
                    tokens.push(Token::Invalid);
                    tokenizer.recover();
                }
            }
        }

        Self::from_tokens(tokens).parse_operators()
    }

    fn from_tokens(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            skipped: 0,
        }
    }

    fn parse_operators(&mut self) -> Vec<ContentOperation> {
        let mut operators = Vec::new();
        let mut operand_stack: Vec<Token> = Vec::new();

        while self.position < self.tokens.len() {
            let token = self.tokens[self.position].clone();
            self.position += 1;

            match token {
                Token::Operator(op) => {
                    match self.parse_operator(&op, &mut operand_stack) {
                        Ok(operator) => operators.push(operator),
                        Err(err) => {
                            self.skipped += 1;
                            warn!(operator = %op, error = %err, "skipping malformed operator");
                        }
                    }
                    operand_stack.clear();
                }
                Token::Invalid => {
                    self.skipped += 1;
                    operand_stack.clear();
                }
                other => operand_stack.push(other),
            }
        }

        operators
    }

    fn parse_operator(
        &mut self,
        op: &str,
        operands: &mut Vec<Token>,
    ) -> ParseResult<ContentOperation> {
        let operator = match op {
            "BT" => ContentOperation::BeginText,
            "ET" => ContentOperation::EndText,

            "Tf" => {
                if operands.len() < 2 {
                    return Err(ParseError::SyntaxError {
                        position: self.position,
                        message: format!("Tf expects 2 operands, found {}", operands.len()),
                    });
                }
                let size = self.pop_number(operands)?;
                let font = self.pop_name(operands)?;
                ContentOperation::SetFont(font, size)
            }

            "Tj" => ContentOperation::ShowText(self.pop_string(operands)?),
            "TJ" => {
                let array = self.pop_array(operands)?;
                ContentOperation::ShowTextArray(self.parse_text_array(array)?)
            }
            "'" => ContentOperation::NextLineShowText(self.pop_string(operands)?),
            "\"" => {
                let text = self.pop_string(operands)?;
                let ac = self.pop_number(operands)?;
                let aw = self.pop_number(operands)?;
                ContentOperation::SetSpacingNextLineShowText(aw, ac, text)
            }

            "q" => ContentOperation::SaveGraphicsState,
            "Q" => ContentOperation::RestoreGraphicsState,

            "Do" => ContentOperation::PaintXObject(self.pop_name(operands)?),

            "BI" | "ID" => ContentOperation::Other(op.to_string()),
            "EI" => ContentOperation::InlineImage,

            _ => ContentOperation::Other(op.to_string()),
        };

        Ok(operator)
    }

    fn pop_number(&self, operands: &mut Vec<Token>) -> ParseResult<f32> {
        match operands.pop() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Integer(i)) => Ok(i as f32),
            other => Err(self.unexpected("number", other)),
        }
    }

    fn pop_name(&self, operands: &mut Vec<Token>) -> ParseResult<String> {
        match operands.pop() {
            Some(Token::Name(n)) => Ok(n),
            other => Err(self.unexpected("name", other)),
        }
    }

    fn pop_string(&self, operands: &mut Vec<Token>) -> ParseResult<Vec<u8>> {
        match operands.pop() {
            Some(Token::String(s)) | Some(Token::HexString(s)) => Ok(s),
            other => Err(self.unexpected("string", other)),
        }
    }

    fn pop_array(&self, operands: &mut Vec<Token>) -> ParseResult<Vec<Token>> {
        if operands.last() != Some(&Token::ArrayEnd) {
            return Err(self.unexpected("array", operands.last().cloned()));
        }
        operands.pop();

        let mut array = Vec::new();
        while let Some(token) = operands.pop() {
            if token == Token::ArrayStart {
                array.reverse();
                return Ok(array);
            }
            array.push(token);
        }

        Err(ParseError::SyntaxError {
            position: self.position,
            message: "Unbalanced array".to_string(),
        })
    }

    fn parse_text_array(&self, tokens: Vec<Token>) -> ParseResult<Vec<TextElement>> {
        tokens
            .into_iter()
            .map(|token| match token {
                Token::String(s) | Token::HexString(s) => Ok(TextElement::Text(s)),
                Token::Number(n) => Ok(TextElement::Spacing(n)),
                Token::Integer(i) => Ok(TextElement::Spacing(i as f32)),
                other => Err(self.unexpected("string or number", Some(other))),
            })
            .collect()
    }

    fn unexpected(&self, expected: &str, found: Option<Token>) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: found.map_or_else(|| "nothing".to_string(), |t| format!("{t:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_numbers() {
        let input = b"123 -45 3.14 -0.5 .5";
        let mut tokenizer = ContentTokenizer::new(input);

        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Integer(123)));
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Integer(-45)));
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Number(3.14)));
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Number(-0.5)));
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Number(0.5)));
        assert_eq!(tokenizer.next_token().unwrap(), None);
    }

    #[test]
    fn test_tokenize_strings() {
        let input = b"(Hello World) (Hello\\nWorld) (Nested (paren)) (\\101)";
        let mut tokenizer = ContentTokenizer::new(input);

        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::String(b"Hello World".to_vec()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::String(b"Hello\nWorld".to_vec()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::String(b"Nested (paren)".to_vec()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::String(b"A".to_vec()))
        );
    }

    #[test]
    fn test_tokenize_hex_strings() {
        let input = b"<48656C6C6F> <48 65 6C 6C 6F> <414>";
        let mut tokenizer = ContentTokenizer::new(input);

        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::HexString(b"Hello".to_vec()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::HexString(b"Hello".to_vec()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::HexString(vec![0x41, 0x40]))
        );
    }

    #[test]
    fn test_tokenize_names() {
        let input = b"/Name /Name#20with#20spaces /A#42C /F1";
        let mut tokenizer = ContentTokenizer::new(input);

        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::Name("Name".to_string()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::Name("Name with spaces".to_string()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::Name("ABC".to_string()))
        );
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::Name("F1".to_string()))
        );
    }

    #[test]
    fn test_parse_text_operators() {
        let content = b"BT /F1 12 Tf 100 200 Td (Hello World) Tj ET";
        let operators = ContentParser::parse(content).unwrap();

        assert_eq!(
            operators,
            vec![
                ContentOperation::BeginText,
                ContentOperation::SetFont("F1".to_string(), 12.0),
                ContentOperation::Other("Td".to_string()),
                ContentOperation::ShowText(b"Hello World".to_vec()),
                ContentOperation::EndText,
            ]
        );
    }

    #[test]
    fn test_parse_text_array_and_quotes() {
        let content = b"[(AB) -120 <0043>] TJ (x) ' 1 2 (y) \"";
        let operators = ContentParser::parse(content).unwrap();

        assert_eq!(
            operators[0],
            ContentOperation::ShowTextArray(vec![
                TextElement::Text(b"AB".to_vec()),
                TextElement::Spacing(-120.0),
                TextElement::Text(vec![0x00, 0x43]),
            ])
        );
        assert_eq!(operators[1], ContentOperation::NextLineShowText(b"x".to_vec()));
        assert_eq!(
            operators[2],
            ContentOperation::SetSpacingNextLineShowText(1.0, 2.0, b"y".to_vec())
        );
    }

    #[test]
    fn test_malformed_font_selection_is_skipped() {
        // Wrong operand types and counts for Tf must not stop the parse
        let content = b"BT 12 /F1 Tf /F2 Tf (a) Tj /F3 10 Tf (b) Tj ET";
        let operators = ContentParser::parse(content).unwrap();

        assert_eq!(
            operators,
            vec![
                ContentOperation::BeginText,
                ContentOperation::ShowText(b"a".to_vec()),
                ContentOperation::SetFont("F3".to_string(), 10.0),
                ContentOperation::ShowText(b"b".to_vec()),
                ContentOperation::EndText,
            ]
        );
    }

    #[test]
    fn test_inline_image_data_is_skipped() {
        let content = b"q BI /W 2 /H 1 /BPC 8 /CS /G ID \xFF<\x00) EI Q /F1 9 Tf";
        let operators = ContentParser::parse(content).unwrap();

        assert!(operators.contains(&ContentOperation::InlineImage));
        assert_eq!(
            operators.last(),
            Some(&ContentOperation::SetFont("F1".to_string(), 9.0))
        );
    }

    #[test]
    fn test_lenient_parse_resumes_after_bad_token() {
        let content = b"/F1 8 Tf (ok) Tj <zz> Tj (after) Tj";
        assert!(ContentParser::parse(content).is_err());

        let operators = ContentParser::parse_lenient(content);
        assert_eq!(
            operators,
            vec![
                ContentOperation::SetFont("F1".to_string(), 8.0),
                ContentOperation::ShowText(b"ok".to_vec()),
                ContentOperation::ShowText(b"after".to_vec()),
            ]
        );
    }

    #[test]
    fn test_lenient_parse_skips_stray_close_and_unterminated_hex() {
        let content = b"(a) Tj > /F2 9 Tf (b) Tj <41";
        let operators = ContentParser::parse_lenient(content);
        assert_eq!(
            operators,
            vec![
                ContentOperation::ShowText(b"a".to_vec()),
                ContentOperation::SetFont("F2".to_string(), 9.0),
                ContentOperation::ShowText(b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn test_graphics_state_and_xobjects() {
        let content = b"q 1 0 0 1 50 50 cm /Fm0 Do Q";
        let operators = ContentParser::parse(content).unwrap();

        assert_eq!(
            operators,
            vec![
                ContentOperation::SaveGraphicsState,
                ContentOperation::Other("cm".to_string()),
                ContentOperation::PaintXObject("Fm0".to_string()),
                ContentOperation::RestoreGraphicsState,
            ]
        );
    }
}
