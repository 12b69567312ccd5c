use crate::interner::{Keywords, Symbol, SymbolTable};
use crate::language::{Value, list_from_vec, list_with_tail};
use crate::lexer::{Token, tokenize};

// ============================================================================
// Parser
// ============================================================================

/// Recursive-descent parser over a token stream. Produces one datum per
/// [`Parser::get_object`] call and returns `None` at end of input or at the
/// first malformed datum.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    symbols: &'a mut SymbolTable,
    keywords: &'a Keywords,
}

impl<'a> Parser<'a> {
    pub fn new(input: &str, symbols: &'a mut SymbolTable, keywords: &'a Keywords) -> Self {
        Parser {
            tokens: tokenize(input),
            position: 0,
            symbols,
            keywords,
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    pub fn get_object(&mut self) -> Option<Value> {
        let token = self.next_token()?;
        match token {
            Token::Open => self.read_list(),
            Token::VectorOpen => self.read_vector(),
            Token::Close | Token::Dot => None,
            Token::Quote => self.read_shorthand(self.keywords.quote.clone()),
            Token::Quasiquote => self.read_shorthand(self.keywords.quasiquote.clone()),
            Token::Unquote => self.read_shorthand(self.keywords.unquote.clone()),
            Token::UnquoteSplicing => self.read_shorthand(self.keywords.unquote_splicing.clone()),
            Token::Str(s) => Some(Value::string(&s)),
            Token::Char(c) => Some(Value::Char(c)),
            Token::Number(n) => Some(Value::Number(n)),
            Token::Bool(b) => Some(Value::Bool(b)),
            Token::Atom(name) => Some(Value::Symbol(self.symbols.intern(&name))),
        }
    }

    fn read_shorthand(&mut self, head: Symbol) -> Option<Value> {
        let datum = self.get_object()?;
        Some(list_from_vec(vec![Value::Symbol(head), datum]))
    }

    fn read_list(&mut self) -> Option<Value> {
        let mut items = Vec::new();
        loop {
            match self.peek()? {
                Token::Close => {
                    self.position += 1;
                    return Some(list_from_vec(items));
                }
                Token::Dot => {
                    self.position += 1;
                    if items.is_empty() {
                        return None;
                    }
                    let tail = self.get_object()?;
                    return match self.next_token()? {
                        Token::Close => Some(list_with_tail(items, tail)),
                        _ => None,
                    };
                }
                _ => items.push(self.get_object()?),
            }
        }
    }

    fn read_vector(&mut self) -> Option<Value> {
        let mut items = Vec::new();
        loop {
            match self.peek()? {
                Token::Close => {
                    self.position += 1;
                    return Some(Value::vector(items));
                }
                Token::Dot => return None,
                _ => items.push(self.get_object()?),
            }
        }
    }
}

/// Read every datum in `input`, stopping silently at malformed input.
pub fn read_all(input: &str, symbols: &mut SymbolTable, keywords: &Keywords) -> Vec<Value> {
    let mut parser = Parser::new(input, symbols, keywords);
    let mut forms = Vec::new();
    while let Some(form) = parser.get_object() {
        forms.push(form);
    }
    forms
}
