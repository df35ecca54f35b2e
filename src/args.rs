//! Declarative argument parsing.
//!
//! A command's grammar is a [`Parser`] assembled from small [`Rule`]s, each
//! writing into a destination field when it fires:
//!
//! ```text
//!   SET key value [NX|XX] [GET] [EX s|PX ms|KEEPTTL]
//!
//!   Parser::new()
//!       .arg(bytes(&mut key))                      positional
//!       .arg(bytes(&mut value))
//!       .opt(one_of(flag("nx", &mut nx), flag("xx", &mut xx)))
//!       .opt(flag("get", &mut get))               named / flag
//!       .opt(one_of(named("ex", int(&mut ex)), named("px", int(&mut px)))
//!                .or(flag("keepttl", &mut keep)))
//!       .required(2)
//!       .run(args)?;
//! ```
//!
//! Positional rules run first, in order, until the tokens run out. The
//! tokens left after them are offered to the named rules one at a time;
//! a token no named rule accepts is a syntax error. Finally at least
//! `required` positional rules must have fired.
//!
//! Parsing stops at the first error. Destinations may be partly filled at
//! that point and must not be trusted.

use crate::commands::Error;
use bytes::Bytes;
use std::cell::Cell;
use std::str::FromStr;

/// A parsing step.
pub trait Rule {
    /// Tries to consume tokens from the front of `args`.
    ///
    /// Returns how many tokens were consumed. `Ok(0)` means the rule did
    /// not fire.
    fn apply(&mut self, args: &[Bytes]) -> Result<usize, Error>;
}

type BoxedRule<'a> = Box<dyn Rule + 'a>;

/// A complete command grammar.
#[derive(Default)]
pub struct Parser<'a> {
    positional: Vec<BoxedRule<'a>>,
    named: Vec<BoxedRule<'a>>,
    required: usize,
}

impl<'a> Parser<'a> {
    pub fn new() -> Self {
        Self {
            positional: Vec::new(),
            named: Vec::new(),
            required: 0,
        }
    }

    /// Adds a positional rule.
    pub fn arg(mut self, rule: impl Rule + 'a) -> Self {
        self.positional.push(Box::new(rule));
        self
    }

    /// Adds a named rule (keyword, flag or one-of group).
    pub fn opt(mut self, rule: impl Rule + 'a) -> Self {
        self.named.push(Box::new(rule));
        self
    }

    /// Sets how many positional rules must fire.
    pub fn required(mut self, n: usize) -> Self {
        self.required = n;
        self
    }

    pub fn run(mut self, args: &[Bytes]) -> Result<(), Error> {
        if args.len() < self.required {
            return Err(Error::InvalidArgNum);
        }

        let mut rest = args;
        let mut fired = 0;
        for rule in &mut self.positional {
            if rest.is_empty() {
                break;
            }
            let n = rule.apply(rest)?;
            if n > 0 {
                fired += 1;
                rest = &rest[n..];
            }
        }

        while !rest.is_empty() {
            let mut consumed = 0;
            for rule in &mut self.named {
                consumed = rule.apply(rest)?;
                if consumed > 0 {
                    break;
                }
            }
            if consumed == 0 {
                return Err(Error::SyntaxError);
            }
            rest = &rest[consumed..];
        }

        if fired < self.required {
            return Err(Error::InvalidArgNum);
        }
        Ok(())
    }
}

// ============================================================================
// Single-token rules
// ============================================================================

/// Consumes one token and hands it to a setter.
pub struct One<F>(F);

fn one<F>(setter: F) -> One<F>
where
    F: FnMut(&Bytes) -> Result<(), Error>,
{
    One(setter)
}

impl<F> Rule for One<F>
where
    F: FnMut(&Bytes) -> Result<(), Error>,
{
    fn apply(&mut self, args: &[Bytes]) -> Result<usize, Error> {
        match args.first() {
            Some(token) => (self.0)(token).map(|_| 1),
            None => Ok(0),
        }
    }
}

pub fn bytes(dest: &mut Bytes) -> impl Rule + '_ {
    one(move |token| {
        *dest = token.clone();
        Ok(())
    })
}

pub fn opt_bytes(dest: &mut Option<Bytes>) -> impl Rule + '_ {
    one(move |token| {
        *dest = Some(token.clone());
        Ok(())
    })
}

pub fn int<T: FromStr>(dest: &mut T) -> impl Rule + '_ {
    one(move |token| {
        *dest = parse_int(token)?;
        Ok(())
    })
}

pub fn opt_int<T: FromStr>(dest: &mut Option<T>) -> impl Rule + '_ {
    one(move |token| {
        *dest = Some(parse_int(token)?);
        Ok(())
    })
}

/// Accepts `inf`, `+inf` and `-inf`; rejects NaN.
pub fn float(dest: &mut f64) -> impl Rule + '_ {
    one(move |token| {
        *dest = parse_float(token)?;
        Ok(())
    })
}

/// Accepts one of `options` (case-insensitive) and stores its value.
pub fn enum_of<'a, T: Copy>(dest: &'a mut T, options: &'a [(&'a str, T)]) -> impl Rule + 'a {
    one(move |token| {
        let (_, value) = options
            .iter()
            .find(|(name, _)| name.as_bytes().eq_ignore_ascii_case(token))
            .ok_or(Error::SyntaxError)?;
        *dest = *value;
        Ok(())
    })
}

/// Parses a count and publishes it for a later [`strings_n`].
pub fn count(dest: &Cell<usize>) -> impl Rule + '_ {
    one(move |token| {
        dest.set(parse_int(token)?);
        Ok(())
    })
}

pub fn parse_int<T: FromStr>(token: &[u8]) -> Result<T, Error> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidInt)
}

pub fn parse_float(token: &[u8]) -> Result<f64, Error> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(Error::InvalidFloat)
}

// ============================================================================
// Multi-token rules
// ============================================================================

/// Consumes every remaining token.
pub fn strings(dest: &mut Vec<Bytes>) -> impl Rule + '_ {
    rest(move |tokens| {
        dest.extend_from_slice(tokens);
        Ok(())
    })
}

/// Consumes every remaining token as `field value` pairs.
pub fn any_map(dest: &mut Vec<(Bytes, Bytes)>) -> impl Rule + '_ {
    rest(move |tokens| {
        if tokens.len() % 2 != 0 {
            return Err(Error::InvalidArgNum);
        }
        dest.extend(
            tokens
                .chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone())),
        );
        Ok(())
    })
}

/// Consumes every remaining token as `score member` pairs.
pub fn float_map(dest: &mut Vec<(f64, Bytes)>) -> impl Rule + '_ {
    rest(move |tokens| {
        if tokens.len() % 2 != 0 {
            return Err(Error::InvalidArgNum);
        }
        for pair in tokens.chunks_exact(2) {
            dest.push((parse_float(&pair[0])?, pair[1].clone()));
        }
        Ok(())
    })
}

/// Consumes every remaining token at once.
pub struct Rest<F>(F);

fn rest<F>(setter: F) -> Rest<F>
where
    F: FnMut(&[Bytes]) -> Result<(), Error>,
{
    Rest(setter)
}

impl<F> Rule for Rest<F>
where
    F: FnMut(&[Bytes]) -> Result<(), Error>,
{
    fn apply(&mut self, args: &[Bytes]) -> Result<usize, Error> {
        if args.is_empty() {
            return Ok(0);
        }
        (self.0)(args)?;
        Ok(args.len())
    }
}

/// Consumes exactly as many tokens as a prior [`count`] rule parsed.
pub fn strings_n<'a>(n: &'a Cell<usize>, dest: &'a mut Vec<Bytes>) -> impl Rule + 'a {
    StringsN { n, dest }
}

struct StringsN<'a> {
    n: &'a Cell<usize>,
    dest: &'a mut Vec<Bytes>,
}

impl Rule for StringsN<'_> {
    fn apply(&mut self, args: &[Bytes]) -> Result<usize, Error> {
        let n = self.n.get();
        if args.len() < n {
            return Err(Error::InvalidArgNum);
        }
        self.dest.extend_from_slice(&args[..n]);
        Ok(n)
    }
}

// ============================================================================
// Named rules
// ============================================================================

/// Fires on a keyword token (case-insensitive) and sets `dest`.
pub fn flag<'a>(name: &'static str, dest: &'a mut bool) -> Flag<'a> {
    Flag { name, dest }
}

pub struct Flag<'a> {
    name: &'static str,
    dest: &'a mut bool,
}

impl Rule for Flag<'_> {
    fn apply(&mut self, args: &[Bytes]) -> Result<usize, Error> {
        match args.first() {
            Some(token) if token.eq_ignore_ascii_case(self.name.as_bytes()) => {
                *self.dest = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

/// Fires on a keyword token, then requires every sub-rule to fire on the
/// tokens after it.
pub fn named<'a>(name: &'static str, rule: impl Rule + 'a) -> Named<'a> {
    Named {
        name,
        rules: vec![Box::new(rule)],
    }
}

pub struct Named<'a> {
    name: &'static str,
    rules: Vec<BoxedRule<'a>>,
}

impl<'a> Named<'a> {
    pub fn and(mut self, rule: impl Rule + 'a) -> Self {
        self.rules.push(Box::new(rule));
        self
    }
}

impl Rule for Named<'_> {
    fn apply(&mut self, args: &[Bytes]) -> Result<usize, Error> {
        match args.first() {
            Some(token) if token.eq_ignore_ascii_case(self.name.as_bytes()) => {}
            _ => return Ok(0),
        }

        let mut consumed = 1;
        for rule in &mut self.rules {
            match rule.apply(&args[consumed..])? {
                0 => return Err(Error::SyntaxError),
                n => consumed += n,
            }
        }
        Ok(consumed)
    }
}

/// Mutually exclusive alternatives. Firing two different alternatives in
/// one command is a syntax error.
pub fn one_of<'a>(first: impl Rule + 'a, second: impl Rule + 'a) -> OneOf<'a> {
    OneOf {
        rules: vec![Box::new(first), Box::new(second)],
        fired: None,
    }
}

pub struct OneOf<'a> {
    rules: Vec<BoxedRule<'a>>,
    fired: Option<usize>,
}

impl<'a> OneOf<'a> {
    pub fn or(mut self, rule: impl Rule + 'a) -> Self {
        self.rules.push(Box::new(rule));
        self
    }
}

impl Rule for OneOf<'_> {
    fn apply(&mut self, args: &[Bytes]) -> Result<usize, Error> {
        for (i, rule) in self.rules.iter_mut().enumerate() {
            let n = rule.apply(args)?;
            if n == 0 {
                continue;
            }
            if self.fired.is_some_and(|prev| prev != i) {
                return Err(Error::SyntaxError);
            }
            self.fired = Some(i);
            return Ok(n);
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<Bytes> {
        s.split_whitespace().map(|w| Bytes::from(w.to_string())).collect()
    }

    #[derive(Debug, Default)]
    struct SetArgs {
        key: Bytes,
        value: Bytes,
        nx: bool,
        xx: bool,
        get: bool,
        ex: Option<i64>,
        px: Option<i64>,
        keep_ttl: bool,
    }

    fn parse_set(input: &str) -> Result<SetArgs, Error> {
        let mut a = SetArgs::default();
        Parser::new()
            .arg(bytes(&mut a.key))
            .arg(bytes(&mut a.value))
            .opt(one_of(flag("nx", &mut a.nx), flag("xx", &mut a.xx)))
            .opt(flag("get", &mut a.get))
            .opt(
                one_of(named("ex", opt_int(&mut a.ex)), named("px", opt_int(&mut a.px)))
                    .or(flag("keepttl", &mut a.keep_ttl)),
            )
            .required(2)
            .run(&args(input))?;
        Ok(a)
    }

    #[test]
    fn test_positional() {
        let a = parse_set("name alice").unwrap();
        assert_eq!(a.key, "name");
        assert_eq!(a.value, "alice");
        assert!(!a.nx && !a.xx && !a.get);
    }

    #[test]
    fn test_named_any_order_any_case() {
        let a = parse_set("k v get EX 10 nx").unwrap();
        assert!(a.get);
        assert!(a.nx);
        assert_eq!(a.ex, Some(10));
        assert_eq!(a.px, None);
    }

    #[test]
    fn test_missing_required() {
        assert_eq!(parse_set("k").unwrap_err(), Error::InvalidArgNum);
        assert_eq!(parse_set("").unwrap_err(), Error::InvalidArgNum);
    }

    #[test]
    fn test_unknown_token() {
        assert_eq!(parse_set("k v bogus").unwrap_err(), Error::SyntaxError);
    }

    #[test]
    fn test_one_of_exclusive() {
        assert_eq!(parse_set("k v nx xx").unwrap_err(), Error::SyntaxError);
        assert_eq!(parse_set("k v ex 1 keepttl").unwrap_err(), Error::SyntaxError);
        assert!(parse_set("k v nx nx").is_ok());
    }

    #[test]
    fn test_named_requires_value() {
        assert_eq!(parse_set("k v ex").unwrap_err(), Error::SyntaxError);
        assert_eq!(parse_set("k v ex ten").unwrap_err(), Error::InvalidInt);
    }

    #[test]
    fn test_int_and_float() {
        let mut n: i64 = 0;
        let mut f: f64 = 0.0;
        Parser::new()
            .arg(int(&mut n))
            .arg(float(&mut f))
            .required(2)
            .run(&args("-7 +inf"))
            .unwrap();
        assert_eq!(n, -7);
        assert_eq!(f, f64::INFINITY);

        let mut f: f64 = 0.0;
        let err = Parser::new().arg(float(&mut f)).run(&args("nan")).unwrap_err();
        assert_eq!(err, Error::InvalidFloat);
    }

    #[test]
    fn test_enum() {
        const ORDERS: [(&str, u8); 2] = [("asc", 1), ("desc", 2)];
        let mut order = 0u8;
        Parser::new()
            .arg(enum_of(&mut order, &ORDERS))
            .run(&args("DESC"))
            .unwrap();
        assert_eq!(order, 2);

        let mut order = 0u8;
        let err = Parser::new()
            .arg(enum_of(&mut order, &ORDERS))
            .run(&args("up"))
            .unwrap_err();
        assert_eq!(err, Error::SyntaxError);
    }

    #[test]
    fn test_variadic() {
        let mut key = Bytes::new();
        let mut members = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(strings(&mut members))
            .required(2)
            .run(&args("s a b c"))
            .unwrap();
        assert_eq!(members, args("a b c"));

        let mut key = Bytes::new();
        let mut members = Vec::new();
        let err = Parser::new()
            .arg(bytes(&mut key))
            .arg(strings(&mut members))
            .required(2)
            .run(&args("s"))
            .unwrap_err();
        assert_eq!(err, Error::InvalidArgNum);
    }

    #[test]
    fn test_counted_strings() {
        let n = Cell::new(0);
        let mut keys = Vec::new();
        let mut withscores = false;
        Parser::new()
            .arg(count(&n))
            .arg(strings_n(&n, &mut keys))
            .opt(flag("withscores", &mut withscores))
            .required(2)
            .run(&args("2 a b WITHSCORES"))
            .unwrap();
        assert_eq!(keys, args("a b"));
        assert!(withscores);

        let n = Cell::new(0);
        let mut keys = Vec::new();
        let err = Parser::new()
            .arg(count(&n))
            .arg(strings_n(&n, &mut keys))
            .run(&args("3 a b"))
            .unwrap_err();
        assert_eq!(err, Error::InvalidArgNum);
    }

    #[test]
    fn test_maps() {
        let mut pairs = Vec::new();
        Parser::new()
            .arg(any_map(&mut pairs))
            .run(&args("f1 v1 f2 v2"))
            .unwrap();
        assert_eq!(pairs.len(), 2);

        let mut pairs = Vec::new();
        let err = Parser::new()
            .arg(any_map(&mut pairs))
            .run(&args("f1 v1 f2"))
            .unwrap_err();
        assert_eq!(err, Error::InvalidArgNum);

        let mut scores = Vec::new();
        Parser::new()
            .arg(float_map(&mut scores))
            .run(&args("1 one 2.5 two"))
            .unwrap();
        assert_eq!(scores, vec![(1.0, Bytes::from("one")), (2.5, Bytes::from("two"))]);

        let mut scores = Vec::new();
        let err = Parser::new()
            .arg(float_map(&mut scores))
            .run(&args("x one"))
            .unwrap_err();
        assert_eq!(err, Error::InvalidFloat);
    }

    #[test]
    fn test_named_with_two_values() {
        let mut offset = 0usize;
        let mut limit = 0usize;
        Parser::new()
            .opt(named("limit", int(&mut offset)).and(int(&mut limit)))
            .run(&args("LIMIT 5 10"))
            .unwrap();
        assert_eq!((offset, limit), (5, 10));
    }
}
