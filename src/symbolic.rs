#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
/// a module turns a String expression into a symbolic expression (nom based)
///
///# Example
/// ```rust, ignore
/// use dae_reduce::symbolic::symbolic_engine::Expr;
/// let input = "x^2.3* log(x+y+y^2.6) - der(m)";
/// let parsed_expression = Expr::parse_expression(input)?;
/// println!(" parsed_expression {}", parsed_expression);
/// let compiled = parsed_expression.compile(&["x", "y", "der(m)"])?;
/// println!("{}, Rust function: {}  \n", input, compiled.eval(&[1.0, 2.0, 0.0]));
/// ```
/// ________________________________________________________________________________________________________________________________
pub mod parse_expr;
///____________________________________________________________________________________________________________________________
/// # Symbolic engine
/// a module
/// 1) represents a model expression as an immutable tree
/// 2) substitutes handles by expressions or numbers and answers dependency queries
/// 3) differentiates and evaluates expressions
///# Example#
/// ```rust, ignore
/// use dae_reduce::symbolic::symbolic_engine::Expr;
/// let parsed_expression = Expr::parse_expression("exp(x)+log(y)")?;
/// // return vec of all arguments
/// let all = parsed_expression.all_arguments_are_variables();
/// println!("all arguments are variables {:?}", all);
/// // differentiate with respect to x and y
/// let df_dx = parsed_expression.diff("x").simplify();
/// let df_dy = parsed_expression.diff("y").simplify();
/// println!("df_dx = {}, df_dy = {}", df_dx, df_dy);
/// ```
/// ________________________________________________________________________________________________________________________________________________
pub mod symbolic_engine;
pub mod symbolic_engine_derivatives;
/// compile a symbolic expression into an index-addressed evaluator
pub mod symbolic_lambdify;
/// constant folding and algebraic identities
pub mod symbolic_simplify;
///________________________________________________________________________________________________________________________________________________
///
/// calculate symbolic jacobian, split residuals into affine parts and solve linear systems
/// Example#
/// ```rust, ignore
/// use dae_reduce::symbolic::symbolic_functions::{Jacobian, solve_linear_system};
/// let mut jacobian_instance = Jacobian::new();
/// jacobian_instance.set_funcvecor_from_str(vec!["x + y - p", "x - y - q"])?;
/// jacobian_instance.set_variables(vec!["x", "y"]);
/// jacobian_instance.calc_jacobian();
/// println!("Jacobian: {:?}", jacobian_instance.readable_jacobian());
/// let (a, f0) = jacobian_instance.affine_split().map_err(|(row, var)| format!("{row}: {var}"))?;
/// let rhs: Vec<_> = f0.into_iter().map(|f| -f).collect();
/// let solution = solve_linear_system(&a, &rhs)?;
/// ```
pub mod symbolic_functions;
///______________________________________________________________________________________________________________________________________________
/// linspace and bipartite matching
/// _____________________________________________________________________________________________________________________________________________
pub mod utils;
