use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use string_interner::{DefaultBackend, StringInterner, Symbol as _};

/// An identifier. Symbols handed out by one [`SymbolTable`] for the same
/// (case-folded) name share one allocation, so equality is pointer identity.
#[derive(Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    /// A symbol that no table hands out; used by `gensym`.
    pub fn uninterned(name: &str) -> Self {
        Symbol(Rc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is(&self, name: &str) -> bool {
        &*self.0 == name
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Symbol Table
// ============================================================================

/// Interning table owned by one runtime. Names are case-folded before
/// interning, so `Foo` and `foo` are the same symbol.
pub struct SymbolTable {
    names: StringInterner<DefaultBackend>,
    symbols: Vec<Symbol>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            names: StringInterner::default(),
            symbols: Vec::new(),
        }
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        let folded = if name.chars().any(char::is_uppercase) {
            name.to_lowercase()
        } else {
            name.to_string()
        };
        let index = self.names.get_or_intern(&folded).to_usize();
        if index == self.symbols.len() {
            self.symbols.push(Symbol(Rc::from(folded.as_str())));
        }
        self.symbols[index].clone()
    }

    /// Look a name up without interning it.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        let folded = name.to_lowercase();
        self.names
            .get(folded.as_str())
            .map(|sym| self.symbols[sym.to_usize()].clone())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// ============================================================================
// Well-known symbols
// ============================================================================

/// Symbols the evaluator, expander and compiler dispatch on.
#[derive(Clone)]
pub struct Keywords {
    pub quote: Symbol,
    pub quasiquote: Symbol,
    pub unquote: Symbol,
    pub unquote_splicing: Symbol,
    pub lambda: Symbol,
    pub define: Symbol,
    pub set: Symbol,
    pub begin: Symbol,
    pub if_: Symbol,
    pub define_syntax: Symbol,
    pub syntax_rules: Symbol,
    pub ellipsis: Symbol,
    pub underscore: Symbol,
    pub call_cc: Symbol,
    pub call_with_current_continuation: Symbol,
    // Quasiquote expansions call list builders through these uninterned
    // aliases, which no program text can shadow or redefine.
    pub cons: Symbol,
    pub append: Symbol,
    pub list_to_vector: Symbol,
}

impl Keywords {
    pub fn new(table: &mut SymbolTable) -> Self {
        Keywords {
            quote: table.intern("quote"),
            quasiquote: table.intern("quasiquote"),
            unquote: table.intern("unquote"),
            unquote_splicing: table.intern("unquote-splicing"),
            lambda: table.intern("lambda"),
            define: table.intern("define"),
            set: table.intern("set!"),
            begin: table.intern("begin"),
            if_: table.intern("if"),
            define_syntax: table.intern("define-syntax"),
            syntax_rules: table.intern("syntax-rules"),
            ellipsis: table.intern("..."),
            underscore: table.intern("_"),
            call_cc: table.intern("call/cc"),
            call_with_current_continuation: table.intern("call-with-current-continuation"),
            cons: Symbol::uninterned("cons"),
            append: Symbol::uninterned("append"),
            list_to_vector: Symbol::uninterned("list->vector"),
        }
    }

    /// Heads the evaluator treats as special forms.
    pub fn is_special(&self, sym: &Symbol) -> bool {
        [
            &self.quote,
            &self.quasiquote,
            &self.lambda,
            &self.define,
            &self.set,
            &self.begin,
            &self.if_,
            &self.define_syntax,
            &self.syntax_rules,
        ]
        .into_iter()
        .any(|k| k == sym)
    }
}
