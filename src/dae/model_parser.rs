//! Line-oriented model description reader.
//!
//! ```text
//! model BasicVolume
//! time t
//! state m start 0.00119 free
//! algebraic P
//! parameter V start 1e-3
//! dependent_parameter R = 8.314 / M
//! dependent rho = m / V
//! derivative der(m)
//! equation der(m) = m_flow_in
//! equation P*V - m*R*T        // residual form
//! ```
//! Comments start with `//` or `#`. The role keyword is kept verbatim here;
//! [`Model::load`](crate::dae::model::Model::load) decides whether it is valid.

use crate::dae::dae_error::{DaeError, DaeResult};
use crate::symbolic::parse_expr::{expression, identifier};
use crate::symbolic::symbolic_engine::{Expr, derivative_name};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt},
    multi::many0,
    sequence::{delimited, preceded, terminated},
};

/// One declared variable as written in the description.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub role: String,
    pub start: Option<f64>,
    pub fixed: Option<bool>,
    pub binding: Option<Expr>,
}

impl VariableDeclaration {
    pub fn new(name: &str, role: &str) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            start: None,
            fixed: None,
            binding: None,
        }
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = Some(fixed);
        self
    }

    pub fn with_binding(mut self, binding: Expr) -> Self {
        self.binding = Some(binding);
        self
    }
}

/// Residual equation `residual = 0`, numbered in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationDeclaration {
    pub residual: Expr,
}

/// Serialized form of a model: the variable and equation enumeration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelDescription {
    pub name: String,
    pub variables: Vec<VariableDeclaration>,
    pub equations: Vec<EquationDeclaration>,
}

impl ModelDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn variable(mut self, declaration: VariableDeclaration) -> Self {
        self.variables.push(declaration);
        self
    }

    pub fn equation(mut self, residual: Expr) -> Self {
        self.equations.push(EquationDeclaration { residual });
        self
    }

    /// Adds `lhs = rhs` as the residual `lhs - rhs`.
    pub fn equation_lhs_rhs(self, lhs: Expr, rhs: Expr) -> Self {
        self.equation(lhs - rhs)
    }

    pub fn parse(text: &str) -> DaeResult<Self> {
        parse_model_description(text)
    }
}

enum Line {
    Model(String),
    Variable(VariableDeclaration),
    Equation(Expr),
}

enum Attribute {
    Start(f64),
    Fixed(bool),
}

fn constant_expression(input: &str) -> IResult<&str, f64> {
    map_res(expression, |e| {
        e.simplify()
            .as_const()
            .ok_or_else(|| format!("start value {} is not a number", e))
    })
    .parse(input)
}

/// `der(x)` or a plain identifier
fn variable_name(input: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(
                terminated(tag("der"), multispace0),
                delimited(char('('), delimited(multispace0, identifier, multispace0), char(')')),
                multispace0,
            ),
            derivative_name,
        ),
        map(identifier, String::from),
    ))
    .parse(input)
}

// expressions swallow trailing blanks, hence multispace0 in front
fn attribute(input: &str) -> IResult<&str, Attribute> {
    preceded(
        multispace0,
        alt((
            map(preceded(terminated(tag("start"), multispace1), constant_expression), Attribute::Start),
            map(tag("fixed"), |_| Attribute::Fixed(true)),
            map(tag("free"), |_| Attribute::Fixed(false)),
        )),
    )
    .parse(input)
}

fn model_line(input: &str) -> IResult<&str, Line> {
    map(preceded(terminated(tag("model"), multispace1), identifier), |name| {
        Line::Model(name.to_string())
    })
    .parse(input)
}

fn equation_line(input: &str) -> IResult<&str, Line> {
    let (input, _) = terminated(tag("equation"), multispace1).parse(input)?;
    let (input, lhs) = expression(input)?;
    let (input, rhs) = opt(preceded(delimited(multispace0, char('='), multispace0), expression)).parse(input)?;
    let residual = match rhs {
        Some(rhs) => lhs - rhs,
        None => lhs,
    };
    Ok((input, Line::Equation(residual)))
}

fn variable_line(input: &str) -> IResult<&str, Line> {
    let (input, role) = terminated(identifier, multispace1).parse(input)?;
    let (input, name) = variable_name(input)?;
    let mut declaration = VariableDeclaration::new(&name, role);
    let binding: IResult<&str, Expr> =
        preceded(delimited(multispace0, char('='), multispace0), expression).parse(input);
    if let Ok((rest, expr)) = binding {
        declaration.binding = Some(expr);
        return Ok((rest, Line::Variable(declaration)));
    }
    let (input, attributes) = many0(attribute).parse(input)?;
    for attribute in attributes {
        match attribute {
            Attribute::Start(v) => declaration.start = Some(v),
            Attribute::Fixed(f) => declaration.fixed = Some(f),
        }
    }
    Ok((input, Line::Variable(declaration)))
}

fn parse_line(input: &str) -> IResult<&str, Line> {
    all_consuming(terminated(alt((model_line, equation_line, variable_line)), multispace0)).parse(input)
}

fn strip_comment(line: &str) -> &str {
    let cut = [line.find("//"), line.find('#')].into_iter().flatten().min();
    match cut {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Parses the whole document; the first bad line aborts with `MalformedModel`.
pub fn parse_model_description(text: &str) -> DaeResult<ModelDescription> {
    let mut description = ModelDescription::default();
    for (lineno, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let (_, parsed) = parse_line(line).map_err(|e| {
            DaeError::MalformedModel(format!("line {}: cannot parse '{}': {}", lineno + 1, line, e))
        })?;
        match parsed {
            Line::Model(name) => description.name = name,
            Line::Variable(declaration) => description.variables.push(declaration),
            Line::Equation(residual) => description.equations.push(EquationDeclaration { residual }),
        }
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declarations() {
        let text = "
            model Tank   // a comment
            time t
            state m start 2.5e-3 free
            algebraic P start -1 fixed
            parameter V
            derivative der( m )
            dependent rho = m / V
            # whole line comment
        ";
        let d = parse_model_description(text).unwrap();
        assert_eq!(d.name, "Tank");
        assert_eq!(d.variables.len(), 6);
        assert_eq!(d.variables[0], VariableDeclaration::new("t", "time"));
        assert_eq!(
            d.variables[1],
            VariableDeclaration::new("m", "state").with_start(2.5e-3).with_fixed(false)
        );
        assert_eq!(d.variables[2].start, Some(-1.0));
        assert_eq!(d.variables[2].fixed, Some(true));
        assert_eq!(d.variables[4].name, "der(m)");
        assert_eq!(d.variables[4].role, "derivative");
        assert_eq!(
            d.variables[5].binding,
            Some(Expr::Var("m".to_string()) / Expr::Var("V".to_string()))
        );
    }

    #[test]
    fn test_parse_equations() {
        let text = "equation der(x) = -x\nequation z - 2*x";
        let d = parse_model_description(text).unwrap();
        assert_eq!(d.equations.len(), 2);
        let x = Expr::Var("x".to_string());
        assert_eq!(d.equations[0].residual, Expr::der("x") - (-x.clone()));
        assert_eq!(
            d.equations[1].residual,
            Expr::Var("z".to_string()) - Expr::Const(2.0) * x
        );
    }

    #[test]
    fn test_unknown_role_is_kept_for_validation() {
        let d = parse_model_description("gizmo q start 1").unwrap();
        assert_eq!(d.variables[0].role, "gizmo");
    }

    #[test]
    fn test_bad_lines_are_reported_with_line_number() {
        let err = parse_model_description("state x\nequation x +").unwrap_err();
        match err {
            DaeError::MalformedModel(msg) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(parse_model_description("state x start y").is_err());
        assert!(parse_model_description("state").is_err());
    }

    #[test]
    fn test_builder_matches_parser() {
        let built = ModelDescription::new("Decay")
            .variable(VariableDeclaration::new("x", "state").with_start(1.0))
            .equation_lhs_rhs(Expr::der("x"), -Expr::Var("x".to_string()));
        let parsed = ModelDescription::parse("model Decay\nstate x start 1\nequation der(x) = -x").unwrap();
        assert_eq!(built, parsed);
    }
}
