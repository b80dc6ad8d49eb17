//! Parser for `name-addr` / `addr-spec` header values (RFC 3261 section 25.1)
//!
//! Used for From, To, P-Asserted-Identity and P-Served-User. Only the first
//! value of a comma-separated list is returned.

use nom::{
    branch::alt,
    bytes::complete::{take_till1, take_while1},
    character::complete::{anychar, char, multispace0, none_of},
    combinator::{map, opt},
    multi::{fold_many0, many0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::errors::{CallHistoryError, Result};

/// A display name, URI and header parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameAddr {
    /// Display name with surrounding quotes removed; never empty
    pub display_name: Option<String>,
    pub uri: String,
    /// Header parameters in order, e.g. `sescase=orig` or `lr`
    pub params: Vec<(String, Option<String>)>,
}

impl NameAddr {
    pub fn new(display_name: Option<&str>, uri: impl Into<String>) -> Self {
        Self {
            display_name: display_name.map(str::to_string),
            uri: uri.into(),
            params: Vec::new(),
        }
    }

    /// Parse a header value
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || CallHistoryError::InvalidHeader {
            header: "name-addr",
            value: input.to_string(),
        };

        let (rest, (display_name, uri, params)) =
            alt((name_addr, addr_spec))(input).map_err(|_| invalid())?;

        let rest = rest.trim_start();
        if !rest.is_empty() && !rest.starts_with(',') {
            return Err(invalid());
        }

        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Self {
            display_name,
            uri: uri.trim().to_string(),
            params: params
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.map(|v| v.trim().to_string())))
                .collect(),
        })
    }

    /// Value of a header parameter, matched case-insensitively by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(param, _)| param.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }
}

type Parsed<'a> = (Option<String>, &'a str, Vec<(&'a str, Option<&'a str>)>);

/// `quoted-string`, with quoted-pairs (`\"`, `\\`) unescaped
fn quoted_display(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((preceded(char('\\'), anychar), none_of("\\\""))),
            String::new,
            |mut name, c| {
                name.push(c);
                name
            },
        ),
        char('"'),
    )(input)
}

fn token_display(input: &str) -> IResult<&str, String> {
    map(take_till1(|c: char| c == '<' || c == '"' || c == ','), str::to_string)(input)
}

fn angle_uri(input: &str) -> IResult<&str, &str> {
    delimited(char('<'), take_till1(|c: char| c == '>'), char('>'))(input)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c)
}

fn param(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(
        take_while1(is_token_char),
        opt(preceded(char('='), take_while1(|c: char| c != ';' && c != ','))),
    )(input)
}

fn params(input: &str) -> IResult<&str, Vec<(&str, Option<&str>)>> {
    many0(preceded(tuple((multispace0, char(';'), multispace0)), param))(input)
}

fn name_addr(input: &str) -> IResult<&str, Parsed<'_>> {
    map(
        tuple((
            multispace0,
            opt(alt((quoted_display, token_display))),
            multispace0,
            angle_uri,
            params,
        )),
        |(_, display, _, uri, params)| (display, uri, params),
    )(input)
}

fn addr_spec(input: &str) -> IResult<&str, Parsed<'_>> {
    map(
        tuple((
            multispace0,
            take_while1(|c: char| !c.is_whitespace() && !"<>\";,".contains(c)),
            params,
        )),
        |(_, uri, params)| (None, uri, params),
    )(input)
}
