/* itsyld script grammar
 *
 * a recursive-descent, precedence-driven parser for the script
 * language and its sibling dialects: full linker scripts, version
 * scripts, and --defsym fragments. the parser drives the lexer's mode
 * switching as it descends, builds the expression and statement trees
 * incrementally into the link session, and leaves forward references
 * (phdr names, version dependency tags) to the session's post-parse
 * fix-up pass.
 *
 * any production mismatch is a parse error carrying the script's file
 * and line; the caller treats that as fatal before resolution starts,
 * so a script is never partially honored.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::lexer::{ Lexer, Mode, Token };
use super::expr::{ Expression, UnaryOp, BinaryOp, AssignOp, Builtin };
use super::lang::*;
use super::version::{ Language, VersionNode, VersionPattern };
use super::session::LinkSession;
use super::diag::LinkError;

use std::collections::VecDeque;

/* nested INCLUDE directives beyond this depth are assumed circular */
const MAX_INCLUDE_DEPTH: usize = 10;

/* parse a whole linker script into the session's entity model */
pub fn parse_script(text: &str, filename: &str, session: &mut LinkSession) -> Result<(), LinkError>
{
    let mut parser = Parser::new(text, filename, Mode::Script, session, 0);
    parser.script_file()
}

/* parse a standalone version script (--version-script) */
pub fn parse_version_script(text: &str, filename: &str, session: &mut LinkSession) -> Result<(), LinkError>
{
    let mut parser = Parser::new(text, filename, Mode::VersionScript, session, 0);
    parser.version_nodes(None)
}

/* parse one --defsym fragment: a single symbol assignment, compound
   operators included */
pub fn parse_defsym(text: &str, session: &mut LinkSession) -> Result<(), LinkError>
{
    let mut parser = Parser::new(text, "--defsym", Mode::Defsym, session, 0);
    let symbol = parser.expect_name("symbol name")?;
    let statement = parser.assignment_tail(symbol, false, false)?;

    if parser.peek()?.is_some()
    {
        return Err(parser.error(String::from("trailing junk after --defsym expression")));
    }

    session.script.push(statement);
    Ok(())
}

struct Parser<'a>
{
    lexer: Lexer,
    peeked: VecDeque<Token>,
    session: &'a mut LinkSession,
    include_depth: usize
}

impl<'a> Parser<'a>
{
    fn new(text: &str, filename: &str, mode: Mode, session: &'a mut LinkSession, include_depth: usize) -> Parser<'a>
    {
        Parser
        {
            lexer: Lexer::new(text, filename, mode),
            peeked: VecDeque::new(),
            session,
            include_depth
        }
    }

    /* ---- token plumbing ------------------------------------------- */

    /* flip the lexer mode. a token already in the lookahead queue keeps
       the spelling it was lexed with, so the grammar only switches at
       points where any queued token is mode-neutral punctuation */
    fn set_mode(&mut self, mode: Mode)
    {
        self.lexer.set_mode(mode);
    }

    fn fill(&mut self, depth: usize) -> Result<(), LinkError>
    {
        while self.peeked.len() < depth
        {
            match self.lexer.next_token()?
            {
                Some(token) => self.peeked.push_back(token),
                None => break
            }
        }
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<&Token>, LinkError>
    {
        self.fill(1)?;
        Ok(self.peeked.front())
    }

    fn peek2(&mut self) -> Result<Option<&Token>, LinkError>
    {
        self.fill(2)?;
        Ok(self.peeked.get(1))
    }

    fn bump(&mut self) -> Result<Option<Token>, LinkError>
    {
        self.fill(1)?;
        Ok(self.peeked.pop_front())
    }

    fn error(&self, message: String) -> LinkError
    {
        self.lexer.error(message)
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), LinkError>
    {
        match self.bump()?
        {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(self.error(format!("expected {}, found {:?}", what, t))),
            None => Err(self.error(format!("expected {}, found end of script", what)))
        }
    }

    /* a bare or quoted name */
    fn expect_name(&mut self, what: &str) -> Result<String, LinkError>
    {
        match self.bump()?
        {
            Some(Token::Name(name)) => Ok(name),
            Some(Token::Quoted(name)) => Ok(name),
            Some(t) => Err(self.error(format!("expected {}, found {:?}", what, t))),
            None => Err(self.error(format!("expected {}, found end of script", what)))
        }
    }

    /* is the next token the given bare name? */
    fn peek_is_name(&mut self, name: &str) -> Result<bool, LinkError>
    {
        Ok(match self.peek()?
        {
            Some(Token::Name(n)) => n == name,
            _ => false
        })
    }

    fn skip_semicolons(&mut self) -> Result<(), LinkError>
    {
        while self.peek()? == Some(&Token::Semicolon)
        {
            self.bump()?;
        }
        Ok(())
    }

    /* ---- expressions ---------------------------------------------- */

    /* precedence-climbing expression parser. the caller must already
       have switched the lexer to Expression (or Defsym) mode */
    fn expression(&mut self) -> Result<Expression, LinkError>
    {
        self.ternary()
    }

    /* ?: binds loosest and associates to the right */
    fn ternary(&mut self) -> Result<Expression, LinkError>
    {
        let condition = self.binary(1)?;

        if self.peek()? == Some(&Token::Question)
        {
            self.bump()?;
            let if_true = self.ternary()?;
            self.expect(Token::Colon, "':' in conditional expression")?;
            let if_false = self.ternary()?;
            return Ok(Expression::ternary(condition, if_true, if_false));
        }

        Ok(condition)
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expression, LinkError>
    {
        let mut lhs = self.unary()?;

        loop
        {
            let (op, precedence) = match self.peek()?.and_then(binary_operator)
            {
                Some(pair) if pair.1 >= min_precedence => pair,
                _ => return Ok(lhs)
            };

            self.bump()?;
            let rhs = self.binary(precedence + 1)?;
            lhs = Expression::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expression, LinkError>
    {
        let op = match self.peek()?
        {
            Some(Token::Minus) => Some(UnaryOp::Negate),
            Some(Token::Bang) => Some(UnaryOp::LogicalNot),
            Some(Token::Tilde) => Some(UnaryOp::BitwiseNot),
            _ => None
        };

        match op
        {
            Some(op) =>
            {
                self.bump()?;
                Ok(Expression::unary(op, self.unary()?))
            },
            None => self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expression, LinkError>
    {
        match self.bump()?
        {
            Some(Token::Number(value)) => Ok(Expression::Value(value)),

            /* quoted names are symbol references with awkward spellings */
            Some(Token::Quoted(name)) => Ok(Expression::Symbol(name)),

            Some(Token::Name(name)) =>
            {
                match Builtin::from_name(&name)
                {
                    Some(builtin) => self.builtin_call(builtin),
                    None => Ok(Expression::Symbol(name))
                }
            },

            Some(Token::LeftParen) =>
            {
                let inner = self.expression()?;
                self.expect(Token::RightParen, "')'")?;
                Ok(inner)
            },

            Some(t) => Err(self.error(format!("unexpected {:?} in expression", t))),
            None => Err(self.error(String::from("unexpected end of script in expression")))
        }
    }

    /* a built-in call. SIZEOF_HEADERS may appear with no argument list;
       everything else requires parentheses. the message argument of
       ASSERT rides along as a symbol node */
    fn builtin_call(&mut self, builtin: Builtin) -> Result<Expression, LinkError>
    {
        if self.peek()? != Some(&Token::LeftParen)
        {
            let (min, _) = builtin.arity();
            if min == 0
            {
                return Ok(Expression::Call { builtin, args: Vec::new() });
            }
            return Err(self.error(format!("{:?} requires an argument list", builtin)));
        }

        self.bump()?; /* '(' */
        let mut args = Vec::new();

        if self.peek()? != Some(&Token::RightParen)
        {
            loop
            {
                args.push(self.expression()?);
                match self.peek()?
                {
                    Some(Token::Comma) => { self.bump()?; },
                    _ => break
                }
            }
        }
        self.expect(Token::RightParen, "')'")?;

        let (min, max) = builtin.arity();
        if args.len() < min || args.len() > max
        {
            return Err(self.error(format!("{:?} takes {} to {} arguments, got {}",
                                          builtin, min, max, args.len())));
        }

        Ok(Expression::Call { builtin, args })
    }

    /* ---- assignments ---------------------------------------------- */

    /* the symbol name has been consumed; the operator is next. the
       value expression is read in Expression mode and the terminating
       semicolon consumed */
    fn assignment_tail(&mut self, symbol: String, provide: bool, hidden: bool) -> Result<Statement, LinkError>
    {
        let op = match self.bump()?
        {
            Some(Token::Assign) => AssignOp::Set,
            Some(Token::PlusAssign) => AssignOp::Add,
            Some(Token::MinusAssign) => AssignOp::Subtract,
            Some(Token::StarAssign) => AssignOp::Multiply,
            Some(Token::SlashAssign) => AssignOp::Divide,
            Some(Token::ShiftLeftAssign) => AssignOp::ShiftLeft,
            Some(Token::ShiftRightAssign) => AssignOp::ShiftRight,
            Some(Token::AndAssign) => AssignOp::And,
            Some(Token::OrAssign) => AssignOp::Or,
            Some(t) => return Err(self.error(format!("expected assignment operator, found {:?}", t))),
            None => return Err(self.error(String::from("expected assignment operator")))
        };

        self.set_mode(Mode::Expression);
        let value = self.expression()?;
        self.set_mode(Mode::Script);

        Ok(Statement::Assignment(Assignment { symbol, op, value, provide, hidden }))
    }

    /* PROVIDE(sym = expr) and PROVIDE_HIDDEN(sym = expr) */
    fn provide(&mut self, hidden: bool) -> Result<Statement, LinkError>
    {
        self.expect(Token::LeftParen, "'('")?;
        let symbol = self.expect_name("symbol name")?;
        let statement = self.assignment_tail(symbol, true, hidden)?;
        self.expect(Token::RightParen, "')'")?;
        Ok(statement)
    }

    /* ASSERT(expr, "message") as a statement */
    fn assert_statement(&mut self) -> Result<Statement, LinkError>
    {
        self.expect(Token::LeftParen, "'('")?;
        self.set_mode(Mode::Expression);
        let condition = self.expression()?;
        self.expect(Token::Comma, "','")?;
        let message = match self.bump()?
        {
            Some(Token::Quoted(text)) => text,
            Some(Token::Name(text)) => text,
            _ => return Err(self.error(String::from("ASSERT needs a message string")))
        };
        self.expect(Token::RightParen, "')'")?;
        self.set_mode(Mode::Script);

        Ok(Statement::Assert { condition, message })
    }

    /* ---- top-level script ----------------------------------------- */

    fn script_file(&mut self) -> Result<(), LinkError>
    {
        loop
        {
            self.skip_semicolons()?;
            let keyword = match self.peek()?
            {
                Some(Token::Name(name)) => name.clone(),
                Some(t) =>
                {
                    let unexpected = format!("unexpected {:?} at top level", t);
                    return Err(self.error(unexpected));
                },
                None => return Ok(())
            };

            match keyword.as_str()
            {
                "SECTIONS" => { self.bump()?; self.sections_block()?; },
                "MEMORY" => { self.bump()?; self.memory_block()?; },
                "PHDRS" => { self.bump()?; self.phdrs_block()?; },
                "VERSION" => { self.bump()?; self.version_block()?; },
                "INCLUDE" => { self.bump()?; self.include()?; },

                "ENTRY" =>
                {
                    self.bump()?;
                    let name = self.single_name_argument()?;
                    self.session.script.push(Statement::Entry(name));
                },

                "SEARCH_DIR" =>
                {
                    self.bump()?;
                    let path = self.single_name_argument()?;
                    self.session.script.push(Statement::SearchDir(path));
                },

                "OUTPUT" =>
                {
                    self.bump()?;
                    let file = self.single_name_argument()?;
                    self.session.script.push(Statement::Output(file));
                },

                "OUTPUT_ARCH" =>
                {
                    self.bump()?;
                    let arch = self.single_name_argument()?;
                    self.session.script.push(Statement::OutputArch(arch));
                },

                "TARGET" =>
                {
                    self.bump()?;
                    let target = self.single_name_argument()?;
                    self.session.script.push(Statement::Target(target));
                },

                "STARTUP" =>
                {
                    self.bump()?;
                    let file = self.single_name_argument()?;
                    self.session.script.push(Statement::Startup(file));
                },

                "MAP" =>
                {
                    self.bump()?;
                    let file = self.single_name_argument()?;
                    self.session.script.push(Statement::Map(file));
                },

                "OUTPUT_FORMAT" =>
                {
                    self.bump()?;
                    let names = self.name_list_argument()?;
                    self.session.script.push(Statement::OutputFormat(names));
                },

                "NOCROSSREFS" =>
                {
                    self.bump()?;
                    let names = self.name_list_argument()?;
                    self.session.script.push(Statement::Nocrossrefs(names));
                },

                "EXTERN" =>
                {
                    self.bump()?;
                    let names = self.name_list_argument()?;
                    self.session.script.push(Statement::Extern(names));
                },

                "FORCE_COMMON_ALLOCATION" =>
                {
                    self.bump()?;
                    self.session.script.push(Statement::ForceCommonAllocation);
                },

                "INPUT" =>
                {
                    self.bump()?;
                    let files = self.input_list()?;
                    self.session.script.push(Statement::InputFiles(files));
                },

                "GROUP" =>
                {
                    self.bump()?;
                    let mut files = self.input_list()?;
                    for file in files.iter_mut()
                    {
                        file.group_member = true;
                    }
                    self.session.script.push(Statement::Group(files));
                },

                "ASSERT" =>
                {
                    self.bump()?;
                    let statement = self.assert_statement()?;
                    self.session.script.push(statement);
                },

                "PROVIDE" =>
                {
                    self.bump()?;
                    let statement = self.provide(false)?;
                    self.session.script.push(statement);
                    self.expect(Token::Semicolon, "';'")?;
                },

                "PROVIDE_HIDDEN" =>
                {
                    self.bump()?;
                    let statement = self.provide(true)?;
                    self.session.script.push(statement);
                    self.expect(Token::Semicolon, "';'")?;
                },

                /* anything else must be a symbol assignment */
                _ =>
                {
                    self.bump()?;
                    let statement = self.assignment_tail(keyword, false, false)?;
                    self.session.script.push(statement);
                    self.expect(Token::Semicolon, "';'")?;
                }
            }
        }
    }

    /* KEYWORD(name) with an optional trailing semicolon */
    fn single_name_argument(&mut self) -> Result<String, LinkError>
    {
        self.expect(Token::LeftParen, "'('")?;
        let name = self.expect_name("name")?;
        self.expect(Token::RightParen, "')'")?;
        self.skip_semicolons()?;
        Ok(name)
    }

    /* KEYWORD(a, b, c) or KEYWORD(a b c) */
    fn name_list_argument(&mut self) -> Result<Vec<String>, LinkError>
    {
        self.expect(Token::LeftParen, "'('")?;
        let mut names = Vec::new();

        loop
        {
            match self.bump()?
            {
                Some(Token::Name(name)) => names.push(name),
                Some(Token::Quoted(name)) => names.push(name),
                Some(Token::Comma) => (),
                Some(Token::RightParen) => break,
                Some(t) => return Err(self.error(format!("unexpected {:?} in name list", t))),
                None => return Err(self.error(String::from("unterminated name list")))
            }
        }

        self.skip_semicolons()?;
        Ok(names)
    }

    /* the files named by INPUT and GROUP, with AS_NEEDED regions
       marking contained entries as needed-only */
    fn input_list(&mut self) -> Result<Vec<InputFile>, LinkError>
    {
        self.expect(Token::LeftParen, "'('")?;
        let mut files = Vec::new();
        self.input_list_body(&mut files, false)?;
        self.skip_semicolons()?;
        Ok(files)
    }

    fn input_list_body(&mut self, files: &mut Vec<InputFile>, as_needed: bool) -> Result<(), LinkError>
    {
        loop
        {
            match self.bump()?
            {
                Some(Token::Name(name)) =>
                {
                    if name == "AS_NEEDED"
                    {
                        self.expect(Token::LeftParen, "'('")?;
                        self.input_list_body(files, true)?;
                        continue;
                    }

                    files.push(InputFile
                    {
                        name,
                        from_archive: None,
                        as_needed,
                        group_member: false
                    });
                },
                Some(Token::Quoted(name)) =>
                {
                    files.push(InputFile
                    {
                        name,
                        from_archive: None,
                        as_needed,
                        group_member: false
                    });
                },
                Some(Token::Comma) => (),
                Some(Token::RightParen) => return Ok(()),
                Some(t) => return Err(self.error(format!("unexpected {:?} in input list", t))),
                None => return Err(self.error(String::from("unterminated input list")))
            }
        }
    }

    /* INCLUDE file: resolved through the search path and parsed in
       place, splicing its statements into the session as if inline */
    fn include(&mut self) -> Result<(), LinkError>
    {
        let filename = self.expect_name("script file name")?;

        if self.include_depth >= MAX_INCLUDE_DEPTH
        {
            return Err(self.error(format!("INCLUDE nested too deeply at {}", filename)));
        }

        let path = match self.session.search.find_file(&filename)
        {
            Some(path) => path,
            None => return Err(self.error(format!("cannot find INCLUDE'd script {}", filename)))
        };

        let text = match std::fs::read_to_string(&path)
        {
            Ok(text) => text,
            Err(reason) => return Err(self.error(format!("cannot read script {}: {}", filename, reason)))
        };

        let depth = self.include_depth + 1;
        let mut nested = Parser::new(&text, &filename, Mode::Script, self.session, depth);
        nested.script_file()
    }

    /* ---- MEMORY --------------------------------------------------- */

    /* MEMORY { name [(attrs)] : ORIGIN = expr, LENGTH = expr ... } */
    fn memory_block(&mut self) -> Result<(), LinkError>
    {
        self.expect(Token::LeftBrace, "'{'")?;

        loop
        {
            self.skip_semicolons()?;
            let name = match self.bump()?
            {
                Some(Token::RightBrace) => return Ok(()),
                Some(Token::Name(name)) => name,
                Some(Token::Quoted(name)) => name,
                Some(t) => return Err(self.error(format!("unexpected {:?} in MEMORY block", t))),
                None => return Err(self.error(String::from("unterminated MEMORY block")))
            };

            /* optional attribute string in parentheses */
            let mut attributes = None;
            if self.peek()? == Some(&Token::LeftParen)
            {
                self.bump()?;
                attributes = Some(self.attribute_string()?);
            }

            self.expect(Token::Colon, "':'")?;

            self.expect_origin_keyword()?;
            self.expect(Token::Assign, "'='")?;
            self.set_mode(Mode::Expression);
            let origin = self.expression()?;
            self.set_mode(Mode::Script);
            self.expect(Token::Comma, "','")?;

            self.expect_length_keyword()?;
            self.expect(Token::Assign, "'='")?;
            self.set_mode(Mode::Expression);
            let length = self.expression()?;
            self.set_mode(Mode::Script);

            let file = String::from(self.lexer.file());
            let line = self.lexer.line();

            let region = self.session.memory.lookup(&name);
            region.origin = origin;
            region.length = length;
            if let Some(attrs) = attributes
            {
                region.set_attributes(&attrs, &file, line)?;
            }

            self.session.script.push(Statement::MemoryRegionRef(name));
        }
    }

    /* gather the characters of a region attribute string up to ')' */
    fn attribute_string(&mut self) -> Result<String, LinkError>
    {
        let mut attributes = String::new();
        loop
        {
            match self.bump()?
            {
                Some(Token::RightParen) => return Ok(attributes),
                Some(Token::Name(chunk)) => attributes.push_str(&chunk),
                Some(Token::Bang) => attributes.push('!'),
                Some(t) => return Err(self.error(format!("unexpected {:?} in region attributes", t))),
                None => return Err(self.error(String::from("unterminated region attributes")))
            }
        }
    }

    fn expect_origin_keyword(&mut self) -> Result<(), LinkError>
    {
        match self.bump()?
        {
            Some(Token::Name(n)) if n == "ORIGIN" || n == "org" || n == "o" => Ok(()),
            Some(t) => Err(self.error(format!("expected ORIGIN, found {:?}", t))),
            None => Err(self.error(String::from("expected ORIGIN")))
        }
    }

    fn expect_length_keyword(&mut self) -> Result<(), LinkError>
    {
        match self.bump()?
        {
            Some(Token::Name(n)) if n == "LENGTH" || n == "len" || n == "l" => Ok(()),
            Some(t) => Err(self.error(format!("expected LENGTH, found {:?}", t))),
            None => Err(self.error(String::from("expected LENGTH")))
        }
    }

    /* ---- PHDRS ---------------------------------------------------- */

    /* PHDRS { name type [FILEHDR] [PHDRS] [AT(expr)] [FLAGS(expr)] ; } */
    fn phdrs_block(&mut self) -> Result<(), LinkError>
    {
        self.expect(Token::LeftBrace, "'{'")?;

        loop
        {
            self.skip_semicolons()?;
            let name = match self.bump()?
            {
                Some(Token::RightBrace) => return Ok(()),
                Some(Token::Name(name)) => name,
                Some(Token::Quoted(name)) => name,
                Some(t) => return Err(self.error(format!("unexpected {:?} in PHDRS block", t))),
                None => return Err(self.error(String::from("unterminated PHDRS block")))
            };

            /* the type: one of the fixed ELF segment names resolves at
               parse time, a number is taken as-is, and any other symbol
               becomes an expression judged at evaluation time */
            let header_type = match self.bump()?
            {
                Some(Token::Number(value)) => Expression::Value(value),
                Some(Token::Name(type_name)) => match phdr_type_value(&type_name)
                {
                    Some(value) => Expression::Value(value),
                    None => Expression::Symbol(type_name)
                },
                Some(t) => return Err(self.error(format!("expected program header type, found {:?}", t))),
                None => return Err(self.error(String::from("expected program header type")))
            };

            let mut phdr = ProgramHeader
            {
                name,
                header_type,
                filehdr: false,
                phdrs: false,
                at: None,
                flags: None
            };

            /* qualifiers: FILEHDR and PHDRS take no argument, AT and
               FLAGS require one */
            loop
            {
                match self.bump()?
                {
                    Some(Token::Semicolon) => break,
                    Some(Token::Name(qualifier)) => match qualifier.as_str()
                    {
                        "FILEHDR" => phdr.filehdr = true,
                        "PHDRS" => phdr.phdrs = true,
                        "AT" =>
                        {
                            self.expect(Token::LeftParen, "'('")?;
                            self.set_mode(Mode::Expression);
                            phdr.at = Some(self.expression()?);
                            self.expect(Token::RightParen, "')'")?;
                            self.set_mode(Mode::Script);
                        },
                        "FLAGS" =>
                        {
                            self.expect(Token::LeftParen, "'('")?;
                            self.set_mode(Mode::Expression);
                            phdr.flags = Some(self.expression()?);
                            self.expect(Token::RightParen, "')'")?;
                            self.set_mode(Mode::Script);
                        },
                        other => return Err(self.error(format!("PHDRS syntax error at `{}'", other)))
                    },
                    Some(t) => return Err(self.error(format!("unexpected {:?} in program header", t))),
                    None => return Err(self.error(String::from("unterminated program header")))
                }
            }

            self.session.phdrs.add(phdr);
        }
    }

    /* ---- SECTIONS ------------------------------------------------- */

    fn sections_block(&mut self) -> Result<(), LinkError>
    {
        self.expect(Token::LeftBrace, "'{'")?;

        loop
        {
            self.skip_semicolons()?;
            let name = match self.peek()?
            {
                Some(Token::RightBrace) => { self.bump()?; return Ok(()); },
                Some(Token::Name(name)) => name.clone(),
                Some(t) =>
                {
                    let unexpected = format!("unexpected {:?} in SECTIONS", t);
                    return Err(self.error(unexpected));
                },
                None => return Err(self.error(String::from("unterminated SECTIONS block")))
            };

            match name.as_str()
            {
                "ENTRY" =>
                {
                    self.bump()?;
                    let entry = self.single_name_argument()?;
                    self.session.script.push(Statement::Entry(entry));
                },

                "ASSERT" =>
                {
                    self.bump()?;
                    let statement = self.assert_statement()?;
                    self.session.script.push(statement);
                    self.skip_semicolons()?;
                },

                "PROVIDE" | "PROVIDE_HIDDEN" =>
                {
                    self.bump()?;
                    let statement = self.provide(name == "PROVIDE_HIDDEN")?;
                    self.session.script.push(statement);
                    self.expect(Token::Semicolon, "';'")?;
                },

                "OVERLAY" =>
                {
                    self.bump()?;
                    self.overlay()?;
                },

                _ =>
                {
                    /* a symbol assignment or an output-section statement,
                       told apart by the token after the name. that token
                       may open an address expression, so it has to be
                       lexed in Expression mode: script mode would swallow
                       '-' and '*' into a name */
                    self.bump()?;
                    self.set_mode(Mode::Expression);
                    if peek_is_assignment(self.peek()?)
                    {
                        let statement = self.assignment_tail(name, false, false)?;
                        self.session.script.push(statement);
                        self.expect(Token::Semicolon, "';'")?;
                    }
                    else
                    {
                        let section = self.output_section(name)?;
                        self.session.script.push(Statement::OutputSection(section));
                    }
                }
            }
        }
    }

    /* the header, body and trailer of one output-section statement.
       the name has been consumed already */
    fn output_section(&mut self, name: String) -> Result<OutputSection, LinkError>
    {
        let mut section = OutputSection::new(&name);

        /* header: optional address expression, then an optional section
           kind in parentheses, then the colon */
        self.set_mode(Mode::Expression);

        if self.peek()? != Some(&Token::Colon)
        {
            /* a parenthesis here is ambiguous: (NOLOAD) is a kind, but
               (0x1000 + 4) is an address. settle it with one more
               token of lookahead */
            let is_kind = self.peek()? == Some(&Token::LeftParen)
                && match self.peek2()?
                {
                    Some(Token::Name(n)) => section_kind(n).is_some(),
                    _ => false
                };

            if is_kind == false
            {
                section.address = Some(self.expression()?);
            }
        }

        if self.peek()? == Some(&Token::LeftParen)
        {
            self.bump()?;
            let kind_name = self.expect_name("section kind")?;
            section.kind = match section_kind(&kind_name)
            {
                Some(kind) => kind,
                None => return Err(self.error(format!("unknown section kind {}", kind_name)))
            };
            self.expect(Token::RightParen, "')'")?;
        }

        self.expect(Token::Colon, "':'")?;

        /* post-colon header: AT(lma), ALIGN(n), SUBALIGN(n), constraint */
        loop
        {
            let keyword = match self.peek()?
            {
                Some(Token::Name(n)) => n.clone(),
                _ => break
            };

            match keyword.as_str()
            {
                "AT" =>
                {
                    self.bump()?;
                    self.expect(Token::LeftParen, "'('")?;
                    section.load_address = Some(self.expression()?);
                    self.expect(Token::RightParen, "')'")?;
                },
                "ALIGN" =>
                {
                    self.bump()?;
                    self.expect(Token::LeftParen, "'('")?;
                    section.align = Some(self.expression()?);
                    self.expect(Token::RightParen, "')'")?;
                },
                "SUBALIGN" =>
                {
                    self.bump()?;
                    self.expect(Token::LeftParen, "'('")?;
                    section.subalign = Some(self.expression()?);
                    self.expect(Token::RightParen, "')'")?;
                },
                "ONLY_IF_RO" => { self.bump()?; section.constraint = Constraint::OnlyIfRo; },
                "ONLY_IF_RW" => { self.bump()?; section.constraint = Constraint::OnlyIfRw; },
                "SPECIAL" => { self.bump()?; section.constraint = Constraint::Special; },
                _ => break
            }
        }

        self.set_mode(Mode::Script);
        self.expect(Token::LeftBrace, "'{'")?;
        self.section_body(&mut section)?;
        self.section_trailer(&mut section)?;

        Ok(section)
    }

    /* the brace-delimited child statement list of an output section */
    fn section_body(&mut self, section: &mut OutputSection) -> Result<(), LinkError>
    {
        loop
        {
            self.skip_semicolons()?;
            let token = match self.peek()?
            {
                Some(Token::RightBrace) => { self.bump()?; return Ok(()); },
                Some(token) => token.clone(),
                None => return Err(self.error(String::from("unterminated section body")))
            };

            match token
            {
                Token::Name(name) =>
                {
                    match name.as_str()
                    {
                        "BYTE" | "SHORT" | "LONG" | "QUAD" | "SQUAD" =>
                        {
                            self.bump()?;
                            let size = match name.as_str()
                            {
                                "BYTE" => DataSize::Byte,
                                "SHORT" => DataSize::Short,
                                "LONG" => DataSize::Long,
                                "QUAD" => DataSize::Quad,
                                _ => DataSize::SQuad
                            };
                            let value = self.paren_expression()?;
                            section.children.push(Statement::Data { size, value });
                            self.expect(Token::Semicolon, "';'")?;
                        },

                        "FILL" =>
                        {
                            self.bump()?;
                            let pattern = self.paren_expression()?;
                            section.children.push(Statement::Fill { pattern });
                            self.expect(Token::Semicolon, "';'")?;
                        },

                        "ASSERT" =>
                        {
                            self.bump()?;
                            let statement = self.assert_statement()?;
                            section.children.push(statement);
                            self.skip_semicolons()?;
                        },

                        "PROVIDE" | "PROVIDE_HIDDEN" =>
                        {
                            self.bump()?;
                            let statement = self.provide(name == "PROVIDE_HIDDEN")?;
                            section.children.push(statement);
                            self.expect(Token::Semicolon, "';'")?;
                        },

                        "CONSTRUCTORS" =>
                        {
                            self.bump()?;
                            section.children.push(Statement::Constructors { sorted: false });
                        },

                        "CREATE_OBJECT_SYMBOLS" =>
                        {
                            self.bump()?;
                            section.children.push(Statement::ObjectSymbols);
                        },

                        "KEEP" =>
                        {
                            self.bump()?;
                            self.expect(Token::LeftParen, "'('")?;
                            let mut selector = self.input_section_selector()?;
                            selector.keep = true;
                            self.expect(Token::RightParen, "')'")?;
                            section.children.push(Statement::InputSections(selector));
                        },

                        /* SORT(CONSTRUCTORS) and the sort decorators that
                           wrap a file pattern both start with a sort
                           keyword; constructors are the special case */
                        "SORT" | "SORT_BY_NAME" if self.constructors_ahead()? =>
                        {
                            self.bump()?; /* the sort keyword */
                            self.bump()?; /* '(' */
                            self.bump()?; /* CONSTRUCTORS */
                            self.expect(Token::RightParen, "')'")?;
                            section.children.push(Statement::Constructors { sorted: true });
                        },

                        /* sort decorators and EXCLUDE_FILE wrapping the
                           file pattern itself */
                        "SORT" | "SORT_BY_NAME" | "SORT_BY_ALIGNMENT" | "EXCLUDE_FILE" =>
                        {
                            let selector = self.input_section_selector()?;
                            section.children.push(Statement::InputSections(selector));
                        },

                        _ =>
                        {
                            self.bump()?;
                            if peek_is_assignment(self.peek()?)
                            {
                                let statement = self.assignment_tail(name, false, false)?;
                                section.children.push(statement);
                                self.expect(Token::Semicolon, "';'")?;
                            }
                            else
                            {
                                /* a wildcard input-section selector whose
                                   file pattern we already consumed */
                                let selector = self.selector_tail(WildcardSpec::plain(&name))?;
                                section.children.push(Statement::InputSections(selector));
                            }
                        }
                    }
                },

                Token::Quoted(name) =>
                {
                    self.bump()?;
                    let selector = self.selector_tail(WildcardSpec::plain(&name))?;
                    section.children.push(Statement::InputSections(selector));
                },

                t => return Err(self.error(format!("unexpected {:?} in section body", t)))
            }
        }
    }

    /* true if the next tokens are '(' CONSTRUCTORS */
    fn constructors_ahead(&mut self) -> Result<bool, LinkError>
    {
        if self.peek2()? != Some(&Token::LeftParen)
        {
            return Ok(false);
        }

        self.fill(3)?;
        Ok(match self.peeked.get(2)
        {
            Some(Token::Name(n)) => n == "CONSTRUCTORS",
            _ => false
        })
    }

    /* '(' expr ')' with the expression lexed in Expression mode */
    fn paren_expression(&mut self) -> Result<Expression, LinkError>
    {
        self.expect(Token::LeftParen, "'('")?;
        self.set_mode(Mode::Expression);
        let value = self.expression()?;
        self.expect(Token::RightParen, "')'")?;
        self.set_mode(Mode::Script);
        Ok(value)
    }

    /* a whole input-section selector, file pattern included. handles
       sort decorators and EXCLUDE_FILE on the file pattern */
    fn input_section_selector(&mut self) -> Result<InputSectionSelector, LinkError>
    {
        let file = self.wildcard_spec()?;
        self.selector_tail(file)
    }

    /* the '(' section patterns ')' part, after the file pattern */
    fn selector_tail(&mut self, file: WildcardSpec) -> Result<InputSectionSelector, LinkError>
    {
        let mut selector = InputSectionSelector
        {
            file,
            sections: Vec::new(),
            keep: false
        };

        self.expect(Token::LeftParen, "'('")?;
        loop
        {
            match self.peek()?
            {
                Some(Token::RightParen) => { self.bump()?; break; },
                Some(Token::Comma) => { self.bump()?; },
                Some(_) => selector.sections.push(self.wildcard_spec()?),
                None => return Err(self.error(String::from("unterminated section selector")))
            }
        }

        if selector.sections.is_empty()
        {
            return Err(self.error(String::from("input-section selector names no sections")));
        }

        Ok(selector)
    }

    /* one wildcard spec: a pattern, optionally wrapped in sort
       decorators and prefixed by EXCLUDE_FILE(...) */
    fn wildcard_spec(&mut self) -> Result<WildcardSpec, LinkError>
    {
        let mut exclude = Vec::new();

        if self.peek_is_name("EXCLUDE_FILE")?
        {
            self.bump()?;
            exclude = self.exclusion_list()?;
        }

        let (pattern, sort) = self.sorted_pattern()?;

        Ok(WildcardSpec { pattern, sort, exclude })
    }

    fn exclusion_list(&mut self) -> Result<Vec<String>, LinkError>
    {
        self.expect(Token::LeftParen, "'('")?;
        let mut names = Vec::new();
        loop
        {
            match self.bump()?
            {
                Some(Token::Name(name)) => names.push(name),
                Some(Token::Quoted(name)) => names.push(name),
                Some(Token::Comma) => (),
                Some(Token::RightParen) => return Ok(names),
                Some(t) => return Err(self.error(format!("unexpected {:?} in EXCLUDE_FILE", t))),
                None => return Err(self.error(String::from("unterminated EXCLUDE_FILE")))
            }
        }
    }

    /* a pattern, possibly wrapped in SORT_BY_NAME / SORT_BY_ALIGNMENT
       decorators. one level of nesting composes the two sort keys */
    fn sorted_pattern(&mut self) -> Result<(String, SortMode), LinkError>
    {
        let name = self.expect_name("pattern")?;

        let outer = match name.as_str()
        {
            "SORT" | "SORT_BY_NAME" => SortMode::ByName,
            "SORT_BY_ALIGNMENT" => SortMode::ByAlignment,
            _ => return Ok((name, SortMode::None))
        };

        self.expect(Token::LeftParen, "'('")?;
        let (pattern, inner) = self.sorted_pattern()?;
        self.expect(Token::RightParen, "')'")?;

        let combined = match (outer, inner)
        {
            (outer, SortMode::None) => outer,
            (SortMode::ByName, SortMode::ByAlignment) => SortMode::ByNameThenAlignment,
            (SortMode::ByAlignment, SortMode::ByName) => SortMode::ByAlignmentThenName,

            /* SORT_BY_NAME(SORT_BY_NAME(x)) and friends collapse */
            (outer, inner) if outer == inner => outer,
            _ => return Err(self.error(String::from("sort decorators nested too deeply")))
        };

        Ok((pattern, combined))
    }

    /* the trailer after a section body: >region AT>region :phdr =fill */
    fn section_trailer(&mut self, section: &mut OutputSection) -> Result<(), LinkError>
    {
        loop
        {
            match self.peek()?
            {
                Some(Token::Greater) =>
                {
                    self.bump()?;
                    section.region = Some(self.expect_name("memory region")?);
                },

                Some(Token::Name(n)) if n == "AT" =>
                {
                    self.bump()?;
                    self.expect(Token::Greater, "'>'")?;
                    section.lma_region = Some(self.expect_name("memory region")?);
                },

                Some(Token::Colon) =>
                {
                    self.bump()?;
                    section.phdrs.push(self.expect_name("program header name")?);
                },

                Some(Token::Assign) =>
                {
                    self.bump()?;
                    self.set_mode(Mode::Expression);
                    section.fill = Some(self.expression()?);
                    self.set_mode(Mode::Script);
                },

                /* an optional comma ends the trailer */
                Some(Token::Comma) => { self.bump()?; return Ok(()); },
                _ => return Ok(())
            }
        }
    }

    /* OVERLAY [start] : [AT(addr)] { name { body } ... } trailer
       every member shares the start address; the last member carries
       the update expression that moves the location counter past the
       largest member */
    fn overlay(&mut self) -> Result<(), LinkError>
    {
        self.set_mode(Mode::Expression);

        let start = match self.peek()?
        {
            Some(Token::Colon) => None,
            _ => Some(self.expression()?)
        };

        self.expect(Token::Colon, "':'")?;

        let mut load_address = None;
        if self.peek_is_name("AT")?
        {
            self.bump()?;
            self.expect(Token::LeftParen, "'('")?;
            load_address = Some(self.expression()?);
            self.expect(Token::RightParen, "')'")?;
        }

        self.set_mode(Mode::Script);
        self.expect(Token::LeftBrace, "'{'")?;

        let mut members: Vec<OutputSection> = Vec::new();
        loop
        {
            self.skip_semicolons()?;
            let name = match self.bump()?
            {
                Some(Token::RightBrace) => break,
                Some(Token::Name(name)) => name,
                Some(Token::Quoted(name)) => name,
                Some(t) => return Err(self.error(format!("unexpected {:?} in OVERLAY", t))),
                None => return Err(self.error(String::from("unterminated OVERLAY")))
            };

            let mut member = OutputSection::new(&name);
            member.kind = SectionKind::Overlay;
            member.address = start.clone();
            member.load_address = load_address.clone();

            self.expect(Token::LeftBrace, "'{'")?;
            self.section_body(&mut member)?;
            members.push(member);
        }

        /* shared trailer applies to every member */
        let mut trailer = OutputSection::new("");
        self.section_trailer(&mut trailer)?;
        for member in members.iter_mut()
        {
            member.region = trailer.region.clone();
            member.lma_region = trailer.lma_region.clone();
            member.fill = trailer.fill.clone();
            member.phdrs = trailer.phdrs.clone();
        }

        /* dot must end up past the largest member: fold the members'
           sizes into nested MAX calls carried by the last member */
        let mut update: Option<Expression> = None;
        for member in members.iter().rev()
        {
            let size = Expression::Call
            {
                builtin: Builtin::SizeOf,
                args: vec![Expression::Symbol(member.name.clone())]
            };

            update = Some(match update
            {
                Some(rest) => Expression::Call { builtin: Builtin::Max, args: vec![size, rest] },
                None => size
            });
        }

        if let Some(last) = members.last_mut()
        {
            last.update_dot = update;
        }

        for member in members
        {
            self.session.script.push(Statement::OutputSection(member));
        }

        Ok(())
    }

    /* ---- version scripts ------------------------------------------ */

    /* a VERSION { ... } block inside a linker script: the braces wrap
       version-script syntax */
    fn version_block(&mut self) -> Result<(), LinkError>
    {
        self.expect(Token::LeftBrace, "'{'")?;
        self.set_mode(Mode::VersionScript);
        self.version_nodes(Some(Token::RightBrace))?;
        self.set_mode(Mode::Script);
        Ok(())
    }

    /* a run of version nodes, ending at end-of-input or a closing
       token when embedded in a linker script */
    fn version_nodes(&mut self, until: Option<Token>) -> Result<(), LinkError>
    {
        loop
        {
            self.skip_semicolons()?;
            let tag = match self.peek()?
            {
                None if until.is_none() => return Ok(()),
                None => return Err(self.error(String::from("unterminated VERSION block"))),
                Some(t) if Some(t) == until.as_ref() => { self.bump()?; return Ok(()); },
                Some(Token::LeftBrace) => None,
                Some(Token::Name(name)) => Some(name.clone()),
                Some(t) =>
                {
                    let unexpected = format!("unexpected {:?} in version script", t);
                    return Err(self.error(unexpected));
                }
            };

            if tag.is_some()
            {
                self.bump()?;
            }

            let mut node = VersionNode::new(tag);
            self.expect(Token::LeftBrace, "'{'")?;
            self.version_node_body(&mut node)?;

            /* optional dependency tags before the terminator */
            loop
            {
                match self.bump()?
                {
                    Some(Token::Semicolon) => break,
                    Some(Token::Name(dep)) => node.deps.push(dep),
                    Some(t) => return Err(self.error(format!("unexpected {:?} after version node", t))),
                    None => return Err(self.error(String::from("version node missing ';'")))
                }
            }

            self.session.versions.register(node)
                .map_err(|e| self.error(e.message))?;
        }
    }

    /* the global/local pattern lists of one node, with extern "lang"
       blocks carrying their language tag. patterns before any
       'global:' or 'local:' marker count as global */
    fn version_node_body(&mut self, node: &mut VersionNode) -> Result<(), LinkError>
    {
        let mut global = true;
        loop
        {
            match self.bump()?
            {
                Some(Token::RightBrace) => return Ok(()),
                Some(Token::Semicolon) => (),

                Some(Token::Name(name)) =>
                {
                    /* 'global:' and 'local:' switch the destination list */
                    if (name == "global" || name == "local")
                        && self.peek()? == Some(&Token::Colon)
                    {
                        self.bump()?;
                        global = name == "global";
                        continue;
                    }

                    if name == "extern"
                    {
                        self.extern_block(node, global)?;
                        continue;
                    }

                    self.push_pattern(node, global, &name, Language::C);
                },

                Some(Token::Quoted(name)) => self.push_pattern(node, global, &name, Language::C),

                Some(t) => return Err(self.error(format!("unexpected {:?} in version node", t))),
                None => return Err(self.error(String::from("unterminated version node")))
            }
        }
    }

    /* extern "lang" { patterns } — every contained pattern carries the
       block's language tag */
    fn extern_block(&mut self, node: &mut VersionNode, global: bool) -> Result<(), LinkError>
    {
        let lang_name = match self.bump()?
        {
            Some(Token::Quoted(name)) => name,
            Some(t) => return Err(self.error(format!("expected language string after extern, found {:?}", t))),
            None => return Err(self.error(String::from("expected language string after extern")))
        };

        let language = match Language::from_name(&lang_name)
        {
            Some(language) => language,
            None => return Err(self.error(format!("unknown extern language \"{}\"", lang_name)))
        };

        self.expect(Token::LeftBrace, "'{'")?;
        loop
        {
            match self.bump()?
            {
                Some(Token::RightBrace) => break,
                Some(Token::Semicolon) => (),
                Some(Token::Name(name)) => self.push_pattern(node, global, &name, language),
                Some(Token::Quoted(name)) => self.push_pattern(node, global, &name, language),
                Some(t) => return Err(self.error(format!("unexpected {:?} in extern block", t))),
                None => return Err(self.error(String::from("unterminated extern block")))
            }
        }

        self.skip_semicolons()?;
        Ok(())
    }

    fn push_pattern(&mut self, node: &mut VersionNode, global: bool, pattern: &str, language: Language)
    {
        let pattern = VersionPattern::new(pattern, language);
        match global
        {
            true => node.globals.push(pattern),
            false => node.locals.push(pattern)
        }
    }
}

fn peek_is_assignment(token: Option<&Token>) -> bool
{
    matches!(token,
        Some(Token::Assign) | Some(Token::PlusAssign) | Some(Token::MinusAssign)
        | Some(Token::StarAssign) | Some(Token::SlashAssign)
        | Some(Token::ShiftLeftAssign) | Some(Token::ShiftRightAssign)
        | Some(Token::AndAssign) | Some(Token::OrAssign))
}

fn section_kind(name: &str) -> Option<SectionKind>
{
    match name
    {
        "NOLOAD" => Some(SectionKind::NoLoad),
        "DSECT" => Some(SectionKind::Dsect),
        "COPY" => Some(SectionKind::Copy),
        "INFO" => Some(SectionKind::Info),
        "OVERLAY" => Some(SectionKind::Overlay),
        _ => None
    }
}

/* the operator table: higher binds tighter. ?: sits below all of these
   and unary operators above */
fn binary_operator(token: &Token) -> Option<(BinaryOp, u8)>
{
    match token
    {
        Token::PipePipe => Some((BinaryOp::LogicalOr, 1)),
        Token::AmpAmp => Some((BinaryOp::LogicalAnd, 2)),
        Token::Pipe => Some((BinaryOp::BitwiseOr, 3)),
        Token::Caret => Some((BinaryOp::BitwiseXor, 4)),
        Token::Amp => Some((BinaryOp::BitwiseAnd, 5)),
        Token::EqEq => Some((BinaryOp::Eq, 6)),
        Token::NotEq => Some((BinaryOp::NotEq, 6)),
        Token::Less => Some((BinaryOp::Less, 7)),
        Token::Greater => Some((BinaryOp::Greater, 7)),
        Token::LessEq => Some((BinaryOp::LessEq, 7)),
        Token::GreaterEq => Some((BinaryOp::GreaterEq, 7)),
        Token::ShiftLeft => Some((BinaryOp::ShiftLeft, 8)),
        Token::ShiftRight => Some((BinaryOp::ShiftRight, 8)),
        Token::Plus => Some((BinaryOp::Add, 9)),
        Token::Minus => Some((BinaryOp::Subtract, 9)),
        Token::Star => Some((BinaryOp::Multiply, 10)),
        Token::Slash => Some((BinaryOp::Divide, 10)),
        Token::Percent => Some((BinaryOp::Modulo, 10)),
        _ => None
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::session::{ LinkSession, Config };
    use crate::emulate::Rv64Emulation;

    fn session() -> LinkSession
    {
        let mut session = LinkSession::new(Config::new(), Box::new(Rv64Emulation));
        session.diag.silence();
        session
    }

    fn parse(text: &str) -> LinkSession
    {
        let mut session = session();
        parse_script(text, "test.ld", &mut session).unwrap();
        session
    }

    /* dig the value expression out of a --defsym parse */
    fn defsym_value(text: &str) -> Expression
    {
        let mut session = session();
        parse_defsym(text, &mut session).unwrap();
        match session.script.pop()
        {
            Some(Statement::Assignment(a)) => a.value,
            other => panic!("expected an assignment, got {:?}", other)
        }
    }

    #[test]
    fn entry_and_output_section()
    {
        let session = parse(
            "ENTRY(_start)\n\
             SECTIONS\n\
             {\n\
                 . = 0x80000000;\n\
                 .text : { *(.text .text.*) } > ram\n\
             }");

        assert_eq!(session.script[0], Statement::Entry(String::from("_start")));

        match &session.script[1]
        {
            Statement::Assignment(a) =>
            {
                assert_eq!(a.symbol, ".");
                assert_eq!(a.value, Expression::Value(0x80000000));
            },
            other => panic!("expected dot assignment, got {:?}", other)
        }

        match &session.script[2]
        {
            Statement::OutputSection(s) =>
            {
                assert_eq!(s.name, ".text");
                assert_eq!(s.region.as_deref(), Some("ram"));
                match &s.children[0]
                {
                    Statement::InputSections(sel) =>
                    {
                        assert_eq!(sel.file.pattern, "*");
                        assert_eq!(sel.sections[0].pattern, ".text");
                        assert_eq!(sel.sections[1].pattern, ".text.*");
                    },
                    other => panic!("expected a selector, got {:?}", other)
                }
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition()
    {
        let value = defsym_value("x=1+2*3");
        assert_eq!(value, Expression::binary(BinaryOp::Add,
            Expression::Value(1),
            Expression::binary(BinaryOp::Multiply, Expression::Value(2), Expression::Value(3))));
    }

    #[test]
    fn conditional_binds_loosest()
    {
        let value = defsym_value("x=DEFINED(y)?y:1<<4");
        match value
        {
            Expression::Ternary { condition, if_false, .. } =>
            {
                assert_eq!(*condition, Expression::Call
                {
                    builtin: Builtin::Defined,
                    args: vec![ Expression::Symbol(String::from("y")) ]
                });
                assert_eq!(*if_false, Expression::binary(BinaryOp::ShiftLeft,
                    Expression::Value(1), Expression::Value(4)));
            },
            other => panic!("expected a ternary, got {:?}", other)
        }
    }

    #[test]
    fn builtin_arity_is_checked()
    {
        let mut session = session();
        assert!(parse_defsym("x=SIZEOF(.text,.data)", &mut session).is_err());
        assert!(parse_defsym("x=MAX(1)", &mut session).is_err());
    }

    #[test]
    fn phdrs_qualifiers_without_type_expression()
    {
        let session = parse(
            "PHDRS\n\
             {\n\
                 text PT_LOAD FILEHDR PHDRS ;\n\
                 rodata PT_LOAD ;\n\
                 fancy PT_CUSTOM AT(0x100) FLAGS(6) ;\n\
             }");

        assert_eq!(session.phdrs.len(), 3);

        let text = session.phdrs.get(0).unwrap();
        assert_eq!(text.header_type, Expression::Value(1));
        assert!(text.filehdr && text.phdrs);
        assert!(text.at.is_none());

        let rodata = session.phdrs.get(1).unwrap();
        assert!(rodata.filehdr == false && rodata.phdrs == false);

        /* an unknown symbolic type is carried as a symbol expression */
        let fancy = session.phdrs.get(2).unwrap();
        assert_eq!(fancy.header_type, Expression::Symbol(String::from("PT_CUSTOM")));
        assert_eq!(fancy.at, Some(Expression::Value(0x100)));
        assert_eq!(fancy.flags, Some(Expression::Value(6)));
    }

    #[test]
    fn memory_regions_with_attributes_and_aliases()
    {
        let session = parse(
            "MEMORY\n\
             {\n\
                 rom (rx!w) : ORIGIN = 0x0, LENGTH = 64K\n\
                 ram : org = 0x80000000, len = 2M\n\
             }");

        let rom = session.memory.find("rom").unwrap();
        assert_eq!(rom.flags, REGION_READ | REGION_EXEC);
        assert_eq!(rom.not_flags, REGION_WRITE);
        assert_eq!(rom.length, Expression::Value(64 * 1024));

        let ram = session.memory.find("ram").unwrap();
        assert_eq!(ram.origin, Expression::Value(0x80000000));
        assert_eq!(ram.length, Expression::Value(2 * 1024 * 1024));
    }

    #[test]
    fn keep_and_sorted_patterns()
    {
        let session = parse(
            "SECTIONS { .init_array : { KEEP(*(SORT_BY_NAME(.init_array.*))) } }");

        match &session.script[0]
        {
            Statement::OutputSection(s) => match &s.children[0]
            {
                Statement::InputSections(sel) =>
                {
                    assert!(sel.keep);
                    assert_eq!(sel.sections[0].pattern, ".init_array.*");
                    assert_eq!(sel.sections[0].sort, SortMode::ByName);
                },
                other => panic!("expected a selector, got {:?}", other)
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn exclude_file_rides_on_the_pattern()
    {
        let session = parse(
            "SECTIONS { .dtors : { *(EXCLUDE_FILE(*crtend.o) .dtors) } }");

        match &session.script[0]
        {
            Statement::OutputSection(s) => match &s.children[0]
            {
                Statement::InputSections(sel) =>
                {
                    assert_eq!(sel.sections[0].pattern, ".dtors");
                    assert_eq!(sel.sections[0].exclude, vec![String::from("*crtend.o")]);
                },
                other => panic!("expected a selector, got {:?}", other)
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn constructors_and_data_directives()
    {
        let session = parse(
            "SECTIONS { .ctors : { SORT(CONSTRUCTORS) LONG(0xdeadbeef); FILL(0x90); } }");

        match &session.script[0]
        {
            Statement::OutputSection(s) =>
            {
                assert_eq!(s.children[0], Statement::Constructors { sorted: true });
                assert_eq!(s.children[1], Statement::Data
                {
                    size: DataSize::Long,
                    value: Expression::Value(0xdeadbeef)
                });
                assert_eq!(s.children[2], Statement::Fill
                {
                    pattern: Expression::Value(0x90)
                });
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn section_kind_and_fill_trailer()
    {
        let session = parse(
            "SECTIONS { .bss (NOLOAD) : { *(.bss) } =0xff }");

        match &session.script[0]
        {
            Statement::OutputSection(s) =>
            {
                assert_eq!(s.kind, SectionKind::NoLoad);
                assert!(s.address.is_none());
                assert_eq!(s.fill, Some(Expression::Value(0xff)));
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn section_address_and_lma()
    {
        let session = parse(
            "SECTIONS { .text 0x1000 : AT(0x80000) { *(.text) } :code }");

        match &session.script[0]
        {
            Statement::OutputSection(s) =>
            {
                assert_eq!(s.address, Some(Expression::Value(0x1000)));
                assert_eq!(s.load_address, Some(Expression::Value(0x80000)));
                assert_eq!(s.phdrs, vec![String::from("code")]);
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn group_marks_members_and_as_needed()
    {
        let session = parse("GROUP(-lgcc AS_NEEDED(-lm))");

        match &session.script[0]
        {
            Statement::Group(files) =>
            {
                assert_eq!(files.len(), 2);
                assert_eq!(files[0].name, "-lgcc");
                assert!(files[0].as_needed == false);
                assert!(files[1].as_needed);
                assert!(files.iter().all(|f| f.group_member));
            },
            other => panic!("expected a group, got {:?}", other)
        }
    }

    #[test]
    fn overlay_expands_to_sections_sharing_an_address()
    {
        let session = parse(
            "SECTIONS { OVERLAY 0x1000 : { .ov1 { *(.ov1) } .ov2 { *(.ov2) } } > ram }");

        let sections: Vec<&OutputSection> = session.script.iter().filter_map(|s| match s
        {
            Statement::OutputSection(s) => Some(s),
            _ => None
        }).collect();

        assert_eq!(sections.len(), 2);
        for section in &sections
        {
            assert_eq!(section.kind, SectionKind::Overlay);
            assert_eq!(section.address, Some(Expression::Value(0x1000)));
            assert_eq!(section.region.as_deref(), Some("ram"));
        }

        /* only the last member moves the location counter, by the
           larger of the two sizes */
        assert!(sections[0].update_dot.is_none());
        match sections[1].update_dot.as_ref()
        {
            Some(Expression::Call { builtin: Builtin::Max, args }) => assert_eq!(args.len(), 2),
            other => panic!("expected a MAX call, got {:?}", other)
        }
    }

    #[test]
    fn version_nodes_with_extern_language_and_deps()
    {
        let mut session = session();
        parse_version_script(
            "VERS_1 {\n\
                 global: api_*;\n\
                 extern \"C++\" { std_*; };\n\
                 local: *;\n\
             };\n\
             VERS_2 { global: extra; } VERS_1;",
            "vers.map", &mut session).unwrap();
        session.versions.resolve_dependencies().unwrap();

        assert_eq!(session.versions.len(), 2);

        let v1 = session.versions.iter().next().unwrap();
        assert_eq!(v1.globals[0].pattern, "api_*");
        assert_eq!(v1.globals[0].language, Language::C);
        assert_eq!(v1.globals[1].pattern, "std_*");
        assert_eq!(v1.globals[1].language, Language::Cplusplus);
        assert_eq!(v1.locals[0].pattern, "*");

        let v2 = session.versions.iter().nth(1).unwrap();
        assert_eq!(v2.deps, vec![String::from("VERS_1")]);
        assert_eq!(v2.dep_indices, vec![0]);
    }

    #[test]
    fn version_block_embedded_in_a_script()
    {
        let session = parse(
            "ENTRY(_start)\n\
             VERSION { NODE_A { global: visible; local: *; }; }");

        assert_eq!(session.versions.len(), 1);
        let node = session.versions.iter().next().unwrap();
        assert_eq!(node.tag.as_deref(), Some("NODE_A"));
    }

    #[test]
    fn provide_and_compound_assignment()
    {
        let session = parse(
            "PROVIDE(__stack_top = 0x90000000);\n\
             SECTIONS { .text : { . += 16; } }");

        match &session.script[0]
        {
            Statement::Assignment(a) =>
            {
                assert!(a.provide);
                assert!(a.hidden == false);
                assert_eq!(a.symbol, "__stack_top");
            },
            other => panic!("expected a PROVIDE assignment, got {:?}", other)
        }

        match &session.script[1]
        {
            Statement::OutputSection(s) => match &s.children[0]
            {
                Statement::Assignment(a) =>
                {
                    assert_eq!(a.symbol, ".");
                    assert_eq!(a.op, AssignOp::Add);
                    assert_eq!(a.value, Expression::Value(16));
                },
                other => panic!("expected a dot assignment, got {:?}", other)
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn defsym_accepts_compound_operators()
    {
        let mut session = session();
        parse_defsym("x+=1", &mut session).unwrap();

        match session.script.pop()
        {
            Some(Statement::Assignment(a)) =>
            {
                assert_eq!(a.symbol, "x");
                assert_eq!(a.op, AssignOp::Add);
                assert_eq!(a.value, Expression::Value(1));
            },
            other => panic!("expected an assignment, got {:?}", other)
        }
    }

    #[test]
    fn section_address_expressions_split_operators()
    {
        /* the address expression starts right after the section name, so
           its first token must not be swallowed by pattern lexing */
        let session = parse(
            "SECTIONS { .text base-4 : { *(.text) } }");

        match &session.script[0]
        {
            Statement::OutputSection(s) =>
            {
                assert_eq!(s.address, Some(Expression::binary(BinaryOp::Subtract,
                    Expression::Symbol(String::from("base")),
                    Expression::Value(4))));
            },
            other => panic!("expected an output section, got {:?}", other)
        }
    }

    #[test]
    fn stray_tokens_name_the_offender()
    {
        let mut top_level = session();
        let err = parse_script("}", "bad.ld", &mut top_level).unwrap_err();
        assert!(err.message.contains("unexpected"));

        let mut in_sections = session();
        let err = parse_script("SECTIONS { ( }", "bad.ld", &mut in_sections).unwrap_err();
        assert!(err.message.contains("unexpected"));

        let mut in_versions = session();
        let err = parse_version_script("NODE { global: a; }; )", "vers.map", &mut in_versions).unwrap_err();
        assert!(err.message.contains("unexpected"));
    }

    #[test]
    fn broken_scripts_are_rejected_with_location()
    {
        let mut truncated = session();
        let err = parse_script("SECTIONS { .text : { *(.text) }", "bad.ld", &mut truncated).unwrap_err();
        assert!(err.location.is_some());

        let mut malformed = session();
        assert!(parse_script("ENTRY _start", "bad.ld", &mut malformed).is_err());
    }
}
