/* itsyld script tokenizer
 *
 * the script language cannot be tokenized without context: a '*' is a
 * wildcard in a section body but a multiplication inside ALIGN(), and
 * file names swallow characters ('-', '/') that expressions treat as
 * operators. the grammar therefore switches the lexer between modes as
 * it descends, the same way the original tools flip lexer states.
 *
 * modes: Script for statement-level text and file/section patterns,
 * Expression inside expressions, VersionScript for version nodes,
 * Defsym for --defsym command-line fragments.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::diag::LinkError;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode
{
    Script,
    Expression,
    VersionScript,
    Defsym
}

#[derive(Clone, PartialEq, Debug)]
pub enum Token
{
    Name(String),
    Number(u64),
    Quoted(String),

    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    Colon,
    Question,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    ShiftLeft,
    ShiftRight,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    EqEq,
    NotEq,
    Amp,
    AmpAmp,
    Caret,
    Pipe,
    PipePipe,
    Bang,
    Tilde,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
    AndAssign,
    OrAssign
}

pub struct Lexer
{
    chars: Vec<char>,
    pos: usize,
    line: usize,
    file: String,
    mode: Mode
}

impl Lexer
{
    pub fn new(text: &str, file: &str, mode: Mode) -> Lexer
    {
        Lexer
        {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            file: String::from(file),
            mode
        }
    }

    /* the grammar flips the mode as it descends into expressions and
       back out. takes effect from the next token read */
    pub fn set_mode(&mut self, mode: Mode)
    {
        self.mode = mode;
    }

    pub fn mode(&self) -> Mode { self.mode }
    pub fn line(&self) -> usize { self.line }
    pub fn file(&self) -> &str { &self.file }

    pub fn error(&self, message: String) -> LinkError
    {
        LinkError::at(message, &self.file, self.line)
    }

    fn current(&self) -> Option<char>
    {
        self.chars.get(self.pos).copied()
    }

    fn lookahead(&self, ahead: usize) -> Option<char>
    {
        self.chars.get(self.pos + ahead).copied()
    }

    fn advance(&mut self)
    {
        if self.current() == Some('\n')
        {
            self.line = self.line + 1;
        }
        self.pos = self.pos + 1;
    }

    /* skip whitespace and block comments, keeping the line count honest */
    fn skip_blanks(&mut self) -> Result<(), LinkError>
    {
        loop
        {
            match self.current()
            {
                Some(c) if c.is_whitespace() => self.advance(),
                Some('/') if self.lookahead(1) == Some('*') =>
                {
                    let start_line = self.line;
                    self.advance();
                    self.advance();
                    loop
                    {
                        match self.current()
                        {
                            Some('*') if self.lookahead(1) == Some('/') =>
                            {
                                self.advance();
                                self.advance();
                                break;
                            },
                            Some(_) => self.advance(),
                            None => return Err(LinkError::at(
                                String::from("unterminated comment"), &self.file, start_line))
                        }
                    }
                },
                _ => return Ok(())
            }
        }
    }

    /* characters allowed to start a bare name in the current mode */
    fn starts_name(&self, c: char) -> bool
    {
        if c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
        {
            return true;
        }

        match self.mode
        {
            /* patterns and file names: wildcards, paths and -lfoo forms */
            Mode::Script => "*?[]/\\-".contains(c),
            Mode::VersionScript => "*?[]".contains(c),
            Mode::Expression | Mode::Defsym => false
        }
    }

    /* characters allowed inside a bare name in the current mode */
    fn continues_name(&self, c: char) -> bool
    {
        if c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
        {
            return true;
        }

        match self.mode
        {
            Mode::Script => "*?[]/\\-".contains(c),
            Mode::VersionScript => "*?[]-".contains(c),
            Mode::Expression | Mode::Defsym => false
        }
    }

    /* pull the next token from the text, or None at end of input */
    pub fn next_token(&mut self) -> Result<Option<Token>, LinkError>
    {
        self.skip_blanks()?;

        let c = match self.current()
        {
            Some(c) => c,
            None => return Ok(None)
        };

        /* double-quoted names keep any characters, wildcard or not */
        if c == '"'
        {
            return Ok(Some(self.quoted()?));
        }

        /* numbers before names: names may start with a digit in script
           mode (a file called 2.o) so try the numeric read first and
           fall back to a name if the token doesn't scan as a number */
        if c.is_ascii_digit()
        {
            return Ok(Some(self.number_or_name()?));
        }

        if self.starts_name(c)
        {
            /* script-mode special cases where a name-start character is
               really an operator: compound assigns and fill patterns */
            if (c == '-' || c == '*' || c == '/') && self.lookahead(1) == Some('=')
            {
                return Ok(Some(self.operator()?));
            }

            return Ok(Some(self.name()));
        }

        self.operator().map(Some)
    }

    fn quoted(&mut self) -> Result<Token, LinkError>
    {
        let start_line = self.line;
        self.advance(); /* opening quote */

        let mut name = String::new();
        loop
        {
            match self.current()
            {
                Some('"') =>
                {
                    self.advance();
                    return Ok(Token::Quoted(name));
                },
                Some(c) =>
                {
                    name.push(c);
                    self.advance();
                },
                None => return Err(LinkError::at(
                    String::from("unterminated string"), &self.file, start_line))
            }
        }
    }

    fn name(&mut self) -> Token
    {
        let mut name = String::new();
        while let Some(c) = self.current()
        {
            if self.continues_name(c) == false
            {
                break;
            }
            name.push(c);
            self.advance();
        }

        Token::Name(name)
    }

    /* read a maximal name-character run and decide whether it is a
       number. 0x prefixes hex; K and M suffixes scale by 1024 */
    fn number_or_name(&mut self) -> Result<Token, LinkError>
    {
        let mut text = String::new();
        while let Some(c) = self.current()
        {
            if self.continues_name(c) == false
            {
                break;
            }
            text.push(c);
            self.advance();
        }

        match parse_number(&text)
        {
            Some(value) => Ok(Token::Number(value)),
            None => match self.mode
            {
                /* file names may begin with digits */
                Mode::Script => Ok(Token::Name(text)),
                _ => Err(self.error(format!("bad number '{}'", text)))
            }
        }
    }

    fn operator(&mut self) -> Result<Token, LinkError>
    {
        let c = match self.current()
        {
            Some(c) => c,
            None => return Err(self.error(String::from("unexpected end of input")))
        };
        self.advance();

        /* longest-match multi-character operators */
        let token = match c
        {
            '{' => Token::LeftBrace,
            '}' => Token::RightBrace,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            ':' => Token::Colon,
            '?' => Token::Question,
            '%' => Token::Percent,
            '~' => Token::Tilde,
            '^' => Token::Caret,

            '<' => match (self.current(), self.lookahead(1))
            {
                (Some('<'), Some('=')) => { self.advance(); self.advance(); Token::ShiftLeftAssign },
                (Some('<'), _) => { self.advance(); Token::ShiftLeft },
                (Some('='), _) => { self.advance(); Token::LessEq },
                _ => Token::Less
            },

            '>' => match (self.current(), self.lookahead(1))
            {
                (Some('>'), Some('=')) => { self.advance(); self.advance(); Token::ShiftRightAssign },
                (Some('>'), _) => { self.advance(); Token::ShiftRight },
                (Some('='), _) => { self.advance(); Token::GreaterEq },
                _ => Token::Greater
            },

            '=' => match self.current()
            {
                Some('=') => { self.advance(); Token::EqEq },
                _ => Token::Assign
            },

            '!' => match self.current()
            {
                Some('=') => { self.advance(); Token::NotEq },
                _ => Token::Bang
            },

            '+' => match self.current()
            {
                Some('=') => { self.advance(); Token::PlusAssign },
                _ => Token::Plus
            },

            '-' => match self.current()
            {
                Some('=') => { self.advance(); Token::MinusAssign },
                _ => Token::Minus
            },

            '*' => match self.current()
            {
                Some('=') => { self.advance(); Token::StarAssign },
                _ => Token::Star
            },

            '/' => match self.current()
            {
                Some('=') => { self.advance(); Token::SlashAssign },
                _ => Token::Slash
            },

            '&' => match self.current()
            {
                Some('&') => { self.advance(); Token::AmpAmp },
                Some('=') => { self.advance(); Token::AndAssign },
                _ => Token::Amp
            },

            '|' => match self.current()
            {
                Some('|') => { self.advance(); Token::PipePipe },
                Some('=') => { self.advance(); Token::OrAssign },
                _ => Token::Pipe
            },

            other => return Err(self.error(format!("stray character '{}'", other)))
        };

        Ok(token)
    }
}

/* scan a number with an optional 0x prefix and K/M scale suffix.
   returns None if the text isn't entirely numeric */
fn parse_number(text: &str) -> Option<u64>
{
    let (body, scale) = match text
    {
        t if t.ends_with('K') || t.ends_with('k') => (&t[..t.len() - 1], 1024),
        t if t.ends_with('M') || t.ends_with('m') => (&t[..t.len() - 1], 1024 * 1024),
        t => (t, 1)
    };

    let value = if body.starts_with("0x") || body.starts_with("0X")
    {
        u64::from_str_radix(&body[2..], 16).ok()?
    }
    else
    {
        u64::from_str_radix(body, 10).ok()?
    };

    value.checked_mul(scale)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn all_tokens(text: &str, mode: Mode) -> Vec<Token>
    {
        let mut lexer = Lexer::new(text, "test.ld", mode);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token().unwrap()
        {
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn script_mode_keeps_wildcards_whole()
    {
        let tokens = all_tokens("*(.text .text.*)", Mode::Script);
        assert_eq!(tokens, vec!
        [
            Token::Name(String::from("*")),
            Token::LeftParen,
            Token::Name(String::from(".text")),
            Token::Name(String::from(".text.*")),
            Token::RightParen
        ]);
    }

    #[test]
    fn expression_mode_splits_operators()
    {
        let tokens = all_tokens("(. + 0x10) & ~(4k - 1)", Mode::Expression);
        assert_eq!(tokens, vec!
        [
            Token::LeftParen,
            Token::Name(String::from(".")),
            Token::Plus,
            Token::Number(0x10),
            Token::RightParen,
            Token::Amp,
            Token::Tilde,
            Token::LeftParen,
            Token::Number(4096),
            Token::Minus,
            Token::Number(1),
            Token::RightParen
        ]);
    }

    #[test]
    fn compound_assignment_operators()
    {
        let tokens = all_tokens(". <<= 2 ; . /= 4", Mode::Script);
        assert_eq!(tokens, vec!
        [
            Token::Name(String::from(".")),
            Token::ShiftLeftAssign,
            Token::Number(2),
            Token::Semicolon,
            Token::Name(String::from(".")),
            Token::SlashAssign,
            Token::Number(4)
        ]);
    }

    #[test]
    fn library_names_and_paths()
    {
        let tokens = all_tokens("GROUP(-lgcc /usr/lib/crt0.o)", Mode::Script);
        assert_eq!(tokens, vec!
        [
            Token::Name(String::from("GROUP")),
            Token::LeftParen,
            Token::Name(String::from("-lgcc")),
            Token::Name(String::from("/usr/lib/crt0.o")),
            Token::RightParen
        ]);
    }

    #[test]
    fn comments_track_line_numbers()
    {
        let mut lexer = Lexer::new("/* one\n   two */\nENTRY", "test.ld", Mode::Script);
        let token = lexer.next_token().unwrap();
        assert_eq!(token, Some(Token::Name(String::from("ENTRY"))));
        assert_eq!(lexer.line(), 3);
    }

    #[test]
    fn quoted_names_escape_wildcard_rules()
    {
        let tokens = all_tokens("\"spaced name\"", Mode::Expression);
        assert_eq!(tokens, vec![ Token::Quoted(String::from("spaced name")) ]);
    }

    #[test]
    fn number_suffixes()
    {
        assert_eq!(parse_number("64K"), Some(65536));
        assert_eq!(parse_number("2M"), Some(2 * 1024 * 1024));
        assert_eq!(parse_number("0x100"), Some(256));
        assert_eq!(parse_number("12a"), None);
    }
}
