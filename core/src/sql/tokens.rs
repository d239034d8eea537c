/// SQL keywords, punctuation and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
pub enum Token {
    // Statement keywords
    SELECT,
    FROM,
    WHERE,
    GROUP,
    ORDER,
    BY,
    LIMIT,
    OFFSET,
    AS,
    ASC,
    DESC,

    // Predicates
    AND,
    OR,
    NOT,
    IN,
    IS,
    NULL,
    LIKE,
    EXISTS,
    DISTINCT,
    ANY,
    ALL,
    CAST,

    // Punctuation
    STAR,
    COMMA,
    DOT,
    LPAREN,
    RPAREN,

    // Operators
    EQ,
    NE,
    LT,
    GT,
    LE,
    GE,
    /// Array overlap `&&`
    OVERLAP,
    /// Array containment `@>`
    CONTAINS,
}

impl Token {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Token::SELECT => "SELECT",
            Token::FROM => "FROM",
            Token::WHERE => "WHERE",
            Token::GROUP => "GROUP",
            Token::ORDER => "ORDER",
            Token::BY => "BY",
            Token::LIMIT => "LIMIT",
            Token::OFFSET => "OFFSET",
            Token::AS => "AS",
            Token::ASC => "ASC",
            Token::DESC => "DESC",
            Token::AND => "AND",
            Token::OR => "OR",
            Token::NOT => "NOT",
            Token::IN => "IN",
            Token::IS => "IS",
            Token::NULL => "NULL",
            Token::LIKE => "LIKE",
            Token::EXISTS => "EXISTS",
            Token::DISTINCT => "DISTINCT",
            Token::ANY => "ANY",
            Token::ALL => "ALL",
            Token::CAST => "CAST",
            Token::STAR => "*",
            Token::COMMA => ",",
            Token::DOT => ".",
            Token::LPAREN => "(",
            Token::RPAREN => ")",
            Token::EQ => "=",
            Token::NE => "<>",
            Token::LT => "<",
            Token::GT => ">",
            Token::LE => "<=",
            Token::GE => ">=",
            Token::OVERLAP => "&&",
            Token::CONTAINS => "@>",
        }
    }

    /// Comparison and array operators are always surrounded by spaces
    pub const fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::EQ
                | Token::NE
                | Token::LT
                | Token::GT
                | Token::LE
                | Token::GE
                | Token::OVERLAP
                | Token::CONTAINS
        )
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
