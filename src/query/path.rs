use crate::query::errors::QueryError;
use std::fmt;

/// A parsed query: one or more location paths joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub alternatives: Vec<LocationPath>,
}

/// Relative paths are evaluated from the document node, the same as absolute ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    DescendantOrSelf,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(String),
    AnyElement,
    Text,
    Comment,
    AnyNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Position(usize),
    Last,
    Attribute {
        name: String,
        comparison: Option<Comparison>,
    },
    Child {
        name: String,
        comparison: Option<Comparison>,
    },
    Text(Comparison),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub negated: bool,
    pub value: String,
}

impl Comparison {
    pub fn matches(&self, actual: &str) -> bool {
        (actual == self.value) != self.negated
    }
}

impl PathExpr {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        if input.trim().is_empty() {
            return Err(QueryError::Empty);
        }
        let mut parser = Parser::new(input);
        let mut alternatives = vec![parser.location_path()?];
        parser.skip_whitespace();
        while parser.eat('|') {
            alternatives.push(parser.location_path()?);
            parser.skip_whitespace();
        }
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self { alternatives })
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(name) => write!(f, "{name}"),
            NodeTest::AnyElement => write!(f, "*"),
            NodeTest::Text => write!(f, "text()"),
            NodeTest::Comment => write!(f, "comment()"),
            NodeTest::AnyNode => write!(f, "node()"),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> QueryError {
        QueryError::Syntax {
            input: self.input.to_string(),
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        let matches = expected
            .chars()
            .enumerate()
            .all(|(i, ch)| self.peek_at(i) == Some(ch));
        if matches {
            self.pos += expected.chars().count();
        }
        matches
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryError> {
        self.skip_whitespace();
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn location_path(&mut self) -> Result<LocationPath, QueryError> {
        self.skip_whitespace();
        let mut steps = Vec::new();
        let absolute = if self.eat_str("//") {
            steps.push(descendant_or_self());
            true
        } else {
            self.eat('/')
        };

        loop {
            self.skip_whitespace();
            steps.push(self.step()?);
            self.skip_whitespace();
            if self.eat_str("//") {
                steps.push(descendant_or_self());
            } else if !self.eat('/') {
                break;
            }
        }

        Ok(LocationPath { absolute, steps })
    }

    fn step(&mut self) -> Result<Step, QueryError> {
        if self.eat_str("..") {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.peek() == Some('.') && !self.peek_at(1).is_some_and(is_name_start) {
            self.pos += 1;
            return Ok(Step {
                axis: Axis::SelfNode,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }

        let test = if self.eat('*') {
            NodeTest::AnyElement
        } else {
            let name = self.name()?;
            if self.eat_str("()") {
                match name.as_str() {
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    "node" => NodeTest::AnyNode,
                    _ => return Err(self.error(&format!("unsupported node test '{name}()'"))),
                }
            } else {
                NodeTest::Name(name)
            }
        };

        let mut predicates = Vec::new();
        loop {
            self.skip_whitespace();
            if !self.eat('[') {
                break;
            }
            let predicate = self.or_expr()?;
            self.expect(']')?;
            predicates.push(predicate);
        }

        Ok(Step {
            axis: Axis::Child,
            test,
            predicates,
        })
    }

    fn name(&mut self) -> Result<String, QueryError> {
        if !self.peek().is_some_and(is_name_start) {
            return Err(self.error("expected a name"));
        }
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn keyword(&mut self, word: &str) -> bool {
        self.skip_whitespace();
        let end = self.pos + word.chars().count();
        let boundary = self.chars.get(end).map_or(true, |ch| !is_name_char(*ch));
        boundary && self.eat_str(word)
    }

    fn or_expr(&mut self) -> Result<Predicate, QueryError> {
        let mut left = self.and_expr()?;
        while self.keyword("or") {
            let right = self.and_expr()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Predicate, QueryError> {
        let mut left = self.unary()?;
        while self.keyword("and") {
            let right = self.unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Predicate, QueryError> {
        self.skip_whitespace();
        if self.eat('(') {
            let inner = self.or_expr()?;
            self.expect(')')?;
            return Ok(inner);
        }

        let checkpoint = self.pos;
        if self.keyword("not") {
            self.skip_whitespace();
            if self.eat('(') {
                let inner = self.or_expr()?;
                self.expect(')')?;
                return Ok(Predicate::Not(Box::new(inner)));
            }
            self.pos = checkpoint;
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<Predicate, QueryError> {
        self.skip_whitespace();
        if self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            let start = self.pos;
            while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[start..self.pos].iter().collect();
            return match digits.parse::<usize>() {
                Ok(0) | Err(_) => Err(self.error("positions start at 1")),
                Ok(position) => Ok(Predicate::Position(position)),
            };
        }

        if self.eat('@') {
            let name = self.name()?;
            let comparison = self.comparison()?;
            return Ok(Predicate::Attribute { name, comparison });
        }

        let name = self.name()?;
        if self.eat_str("()") {
            return match name.as_str() {
                "last" => Ok(Predicate::Last),
                "text" => match self.comparison()? {
                    Some(comparison) => Ok(Predicate::Text(comparison)),
                    None => Err(self.error("text() must be compared to a literal")),
                },
                _ => Err(self.error(&format!("unsupported function '{name}()'"))),
            };
        }

        let comparison = self.comparison()?;
        Ok(Predicate::Child { name, comparison })
    }

    fn comparison(&mut self) -> Result<Option<Comparison>, QueryError> {
        self.skip_whitespace();
        let negated = if self.eat_str("!=") {
            true
        } else if self.eat('=') {
            false
        } else {
            return Ok(None);
        };
        self.skip_whitespace();
        let value = self.literal()?;
        Ok(Some(Comparison { negated, value }))
    }

    fn literal(&mut self) -> Result<String, QueryError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|ch| ch != quote) {
                    self.pos += 1;
                }
                if self.at_end() {
                    return Err(self.error("unterminated string literal"));
                }
                let value = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(value)
            }
            Some(ch) if ch.is_ascii_digit() || ch == '-' => {
                let start = self.pos;
                self.pos += 1;
                while self
                    .peek()
                    .is_some_and(|ch| ch.is_ascii_digit() || ch == '.')
                {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            _ => Err(self.error("expected a string or number literal")),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}

fn is_name_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(input: &str) -> Vec<Step> {
        let mut expr = PathExpr::parse(input).unwrap();
        assert_eq!(expr.alternatives.len(), 1);
        expr.alternatives.remove(0).steps
    }

    #[test]
    fn parse_absolute_child_steps() {
        let steps = steps("/Defs/ThingDef");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].test, NodeTest::Name("Defs".into()));
        assert_eq!(steps[1].axis, Axis::Child);
    }

    #[test]
    fn parse_double_slash_inserts_descendant_step() {
        let steps = steps("Defs//li");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].axis, Axis::DescendantOrSelf);
        assert_eq!(steps[2].test, NodeTest::Name("li".into()));
    }

    #[test]
    fn parse_child_value_predicate() {
        let steps = steps(r#"/Defs/ThingDef[defName = "Human"]"#);
        assert_eq!(
            steps[1].predicates,
            vec![Predicate::Child {
                name: "defName".into(),
                comparison: Some(Comparison {
                    negated: false,
                    value: "Human".into()
                }),
            }]
        );
    }

    #[test]
    fn parse_boolean_predicates() {
        let steps = steps("/Defs/*[@Name='A' or not(@Abstract)][2]");
        assert_eq!(steps[1].test, NodeTest::AnyElement);
        assert!(matches!(steps[1].predicates[0], Predicate::Or(..)));
        assert_eq!(steps[1].predicates[1], Predicate::Position(2));
    }

    #[test]
    fn parse_child_named_like_keyword() {
        let steps = steps("/Defs/A[notes]");
        assert_eq!(
            steps[1].predicates[0],
            Predicate::Child {
                name: "notes".into(),
                comparison: None
            }
        );
    }

    #[test]
    fn parse_union() {
        let expr = PathExpr::parse("/A/B | /A/C").unwrap();
        assert_eq!(expr.alternatives.len(), 2);
    }

    #[test]
    fn parse_dot_steps() {
        let steps = steps("/A/B/../.");
        assert_eq!(steps[2].axis, Axis::Parent);
        assert_eq!(steps[3].axis, Axis::SelfNode);
    }

    #[test]
    fn rejects_malformed_queries() {
        for input in ["", "/Defs/[", "/Defs/A[@x='1'", "/Defs/A[0]", "/Defs/A]", "/Defs/count()"] {
            assert!(PathExpr::parse(input).is_err(), "accepted {input:?}");
        }
    }
}
