//! In-memory DAE model: variables partitioned by role, residual equations
//! partitioned into differential and algebraic sets, and start values.
//!
//! A [`Model`] is built once by [`Model::load`] from a [`ModelDescription`] and is
//! read-only afterwards. Binding expressions of dependent parameters and derived
//! variables are resolved here and substituted into the equations, so later stages
//! only ever see states, derivatives, algebraic variables, independent parameters,
//! inputs and time.

use crate::dae::dae_error::{DaeError, DaeResult};
use crate::dae::dependency_graph::{Cycle, DependencyGraph};
use crate::dae::model_parser::ModelDescription;
use crate::symbolic::symbolic_engine::{Expr, derivative_name, derivative_target};
use log::{debug, info};
use nalgebra::DVector;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// Semantic role of a variable. Fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Time,
    State,
    Derivative,
    Algebraic,
    Parameter,
    DependentParameter,
    Input,
    Dependent,
}

impl Role {
    /// Roles whose value is given by a binding expression rather than solved for.
    pub fn is_bound(&self) -> bool {
        matches!(self, Role::DependentParameter | Role::Dependent)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub role: Role,
    pub start: Option<f64>,
    pub fixed: bool,
    /// Binding as declared, before resolution
    pub binding: Option<Expr>,
}

impl Variable {
    /// Symbolic handle used by equations to refer to this variable.
    pub fn handle(&self) -> Expr {
        Expr::Var(self.name.clone())
    }
}

/// Residual `residual = 0`; `index` is the position in the description.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub index: usize,
    pub residual: Expr,
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    time: String,
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
    states: Vec<String>,
    derivatives: Vec<String>,
    algebraics: Vec<String>,
    parameters: Vec<String>,
    dependent_parameters: Vec<String>,
    inputs: Vec<String>,
    dependents: Vec<String>,
    differential: Vec<Equation>,
    algebraic: Vec<Equation>,
    resolved_bindings: HashMap<String, Expr>,
}

fn malformed(msg: String) -> DaeError {
    DaeError::MalformedModel(msg)
}

impl Model {
    /// Parses the text form of a model description and loads it.
    pub fn parse(text: &str) -> DaeResult<Model> {
        let description = ModelDescription::parse(text)?;
        Model::load(&description)
    }

    pub fn load(description: &ModelDescription) -> DaeResult<Model> {
        let mut model = Model {
            name: description.name.clone(),
            time: String::new(),
            variables: Vec::new(),
            index: HashMap::new(),
            states: Vec::new(),
            derivatives: Vec::new(),
            algebraics: Vec::new(),
            parameters: Vec::new(),
            dependent_parameters: Vec::new(),
            inputs: Vec::new(),
            dependents: Vec::new(),
            differential: Vec::new(),
            algebraic: Vec::new(),
            resolved_bindings: HashMap::new(),
        };

        for declaration in &description.variables {
            let role = Role::from_str(&declaration.role).map_err(|_| {
                malformed(format!(
                    "variable {} has unrecognized role '{}'",
                    declaration.name, declaration.role
                ))
            })?;
            if role.is_bound() != declaration.binding.is_some() {
                return Err(malformed(if role.is_bound() {
                    format!("{} {} needs a binding expression", role, declaration.name)
                } else {
                    format!("{} {} cannot have a binding expression", role, declaration.name)
                }));
            }
            model.push_variable(Variable {
                name: declaration.name.clone(),
                role,
                start: declaration.start,
                fixed: declaration.fixed.unwrap_or(role == Role::Parameter),
                binding: declaration.binding.clone(),
            })?;
        }

        if model.time.is_empty() {
            model.push_variable(Variable {
                name: "time".to_string(),
                role: Role::Time,
                start: None,
                fixed: true,
                binding: None,
            })?;
        }
        // every state gets its derivative handle
        for state in model.states.clone() {
            let der = derivative_name(&state);
            if !model.index.contains_key(&der) {
                model.push_variable(Variable {
                    name: der,
                    role: Role::Derivative,
                    start: None,
                    fixed: false,
                    binding: None,
                })?;
            }
        }
        for der in &model.derivatives {
            let target = derivative_target(der).unwrap_or_default();
            if model.role_of(target) != Some(Role::State) {
                return Err(malformed(format!("{} is the derivative of a non-state", der)));
            }
        }

        model.resolve_bindings()?;

        let derivative_handles = model.derivatives.clone();
        for (i, declared) in description.equations.iter().enumerate() {
            model.check_references(&declared.residual, &format!("equation {}", i))?;
            let residual = declared.residual.substitute_variables(&model.resolved_bindings);
            let equation = Equation { index: i, residual };
            if equation.residual.contains_any_variable(derivative_handles.as_slice()) {
                model.differential.push(equation);
            } else {
                model.algebraic.push(equation);
            }
        }

        if model.differential.len() != model.states.len() {
            return Err(malformed(format!(
                "{} differential equations for {} states",
                model.differential.len(),
                model.states.len()
            )));
        }
        if model.algebraic.len() != model.algebraics.len() {
            return Err(malformed(format!(
                "{} algebraic equations for {} algebraic variables",
                model.algebraic.len(),
                model.algebraics.len()
            )));
        }

        info!(
            "model {} loaded: {} states, {} algebraic, {} parameters ({} dependent), {} inputs, {} derived",
            model.name,
            model.states.len(),
            model.algebraics.len(),
            model.parameters.len(),
            model.dependent_parameters.len(),
            model.inputs.len(),
            model.dependents.len()
        );
        Ok(model)
    }

    fn push_variable(&mut self, variable: Variable) -> DaeResult<()> {
        if self.index.contains_key(&variable.name) {
            return Err(malformed(format!("variable {} declared twice", variable.name)));
        }
        let name = variable.name.clone();
        match variable.role {
            Role::Time => {
                if !self.time.is_empty() {
                    return Err(malformed(format!(
                        "second time variable {} (time is {})",
                        name, self.time
                    )));
                }
                self.time = name.clone();
            }
            Role::State => self.states.push(name.clone()),
            Role::Derivative => {
                if derivative_target(&name).is_none() {
                    return Err(malformed(format!("derivative {} is not of the form der(x)", name)));
                }
                self.derivatives.push(name.clone())
            }
            Role::Algebraic => self.algebraics.push(name.clone()),
            Role::Parameter => self.parameters.push(name.clone()),
            Role::DependentParameter => self.dependent_parameters.push(name.clone()),
            Role::Input => self.inputs.push(name.clone()),
            Role::Dependent => self.dependents.push(name.clone()),
        }
        self.index.insert(name, self.variables.len());
        self.variables.push(variable);
        Ok(())
    }

    fn role_of(&self, name: &str) -> Option<Role> {
        self.index.get(name).map(|&i| self.variables[i].role)
    }

    fn check_references(&self, expr: &Expr, context: &str) -> DaeResult<()> {
        let mut referenced = BTreeSet::new();
        expr.collect_variables(&mut referenced);
        match referenced.into_iter().find(|r| !self.index.contains_key(r)) {
            Some(undeclared) => Err(malformed(format!(
                "{} references undeclared variable {}",
                context, undeclared
            ))),
            None => Ok(()),
        }
    }

    /// Topologically ordered resolution of dependent parameters and derived variables.
    fn resolve_bindings(&mut self) -> DaeResult<()> {
        let mut definitions = Vec::new();
        for variable in &self.variables {
            let Some(binding) = &variable.binding else { continue };
            self.check_references(binding, &format!("binding of {}", variable.name))?;
            if variable.role == Role::DependentParameter {
                let mut referenced = BTreeSet::new();
                binding.collect_variables(&mut referenced);
                for r in referenced {
                    let allowed = matches!(
                        self.role_of(&r),
                        Some(Role::Parameter | Role::DependentParameter | Role::Input | Role::Time)
                    );
                    if !allowed {
                        return Err(malformed(format!(
                            "dependent parameter {} refers to {} which is not a parameter",
                            variable.name, r
                        )));
                    }
                }
            }
            definitions.push((variable.name.clone(), binding.clone()));
        }
        if definitions.is_empty() {
            return Ok(());
        }
        let graph = DependencyGraph::from_definitions(&definitions);
        let order = graph
            .topological_order()
            .map_err(|Cycle(cycle)| malformed(format!("cyclic bindings: {}", cycle.join(" -> "))))?;
        for i in order {
            let name = graph.name(i);
            let Some((_, binding)) = definitions.iter().find(|(n, _)| n == name) else {
                continue;
            };
            let resolved = binding.substitute_variables(&self.resolved_bindings);
            debug!("binding {} = {}", name, resolved);
            self.resolved_bindings.insert(name.to_string(), resolved);
        }
        Ok(())
    }

    pub fn get_variable(&self, name: &str) -> DaeResult<&Variable> {
        self.index
            .get(name)
            .map(|&i| &self.variables[i])
            .ok_or_else(|| DaeError::UnknownVariable(name.to_string()))
    }

    /// Declared start value of every variable, 0 when unset.
    pub fn start_values(&self) -> HashMap<String, f64> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.start.unwrap_or(0.0)))
            .collect()
    }

    /// Start values of the states in state order.
    pub fn initial_state(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.states.len(),
            self.states
                .iter()
                .map(|s| self.variables[self.index[s]].start.unwrap_or(0.0)),
        )
    }

    /// Start values of parameters and inputs that declare one.
    pub fn declared_parameter_values(&self) -> HashMap<String, f64> {
        self.parameter_names()
            .into_iter()
            .filter_map(|name| {
                let start = self.variables[self.index[&name]].start?;
                Some((name, start))
            })
            .collect()
    }

    /// Layout of the parameter vector: independent parameters then inputs.
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().chain(self.inputs.iter()).cloned().collect()
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn derivatives(&self) -> Vec<String> {
        self.states.iter().map(|s| derivative_name(s)).collect()
    }

    pub fn algebraics(&self) -> &[String] {
        &self.algebraics
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn dependent_parameters(&self) -> &[String] {
        &self.dependent_parameters
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn dependents(&self) -> &[String] {
        &self.dependents
    }

    pub fn differential_equations(&self) -> &[Equation] {
        &self.differential
    }

    pub fn algebraic_equations(&self) -> &[Equation] {
        &self.algebraic
    }

    /// Binding of a dependent parameter or derived variable with every other
    /// binding already substituted.
    pub fn resolved_binding(&self, name: &str) -> Option<&Expr> {
        self.resolved_bindings.get(name)
    }

    pub fn resolved_bindings(&self) -> &HashMap<String, Expr> {
        &self.resolved_bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    const TANK: &str = "
        model Tank
        time t
        state m start 2
        algebraic P
        parameter V start 0.5
        parameter R start 8.314
        parameter M
        dependent_parameter R_s = R / M
        dependent rho = m / V
        input m_in start 0.1
        equation der(m) = m_in
        equation P = rho * R_s
    ";

    #[test]
    fn test_role_names() {
        assert_eq!(Role::from_str("dependent_parameter").unwrap(), Role::DependentParameter);
        assert_eq!(Role::Algebraic.to_string(), "algebraic");
        assert_eq!(Role::iter().count(), 8);
        assert!(Role::from_str("gizmo").is_err());
    }

    #[test]
    fn test_load_partitions_variables_and_equations() {
        let model = Model::parse(TANK).unwrap();
        assert_eq!(model.name, "Tank");
        assert_eq!(model.time(), "t");
        assert_eq!(model.states(), &["m".to_string()]);
        assert_eq!(model.derivatives(), vec!["der(m)".to_string()]);
        assert_eq!(model.get_variable("der(m)").unwrap().role, Role::Derivative);
        assert_eq!(model.algebraics(), &["P".to_string()]);
        assert_eq!(model.parameter_names(), vec!["V", "R", "M", "m_in"]);
        assert_eq!(model.differential_equations().len(), 1);
        assert_eq!(model.algebraic_equations().len(), 1);
        assert_eq!(model.algebraic_equations()[0].index, 1);
    }

    #[test]
    fn test_bindings_are_substituted_into_equations() {
        let model = Model::parse(TANK).unwrap();
        let residual = &model.algebraic_equations()[0].residual;
        assert!(!residual.contains_variable("rho"));
        assert!(!residual.contains_variable("R_s"));
        let vars = ["P", "m", "V", "R", "M"];
        let value = residual
            .eval_expression(&vars, &[10.0, 2.0, 0.5, 8.0, 2.0])
            .unwrap();
        // 10 - (2/0.5) * (8/2)
        assert_relative_eq!(value, -6.0, epsilon = 1e-12);
        assert!(model.resolved_binding("rho").is_some());
    }

    #[test]
    fn test_start_values() {
        let model = Model::parse(TANK).unwrap();
        let starts = model.start_values();
        assert_eq!(starts["m"], 2.0);
        assert_eq!(starts["P"], 0.0);
        assert_eq!(model.initial_state()[0], 2.0);
        let declared = model.declared_parameter_values();
        assert_eq!(declared.len(), 3);
        assert!(!declared.contains_key("M"));
        assert!(model.get_variable("V").unwrap().fixed);
    }

    #[test]
    fn test_default_time_variable() {
        let model = Model::parse("state x start 1\nequation der(x) = -x*time").unwrap();
        assert_eq!(model.time(), "time");
        assert_eq!(model.get_variable("time").unwrap().role, Role::Time);
    }

    #[test]
    fn test_unknown_variable() {
        let model = Model::parse(TANK).unwrap();
        assert!(matches!(
            model.get_variable("nope"),
            Err(DaeError::UnknownVariable(name)) if name == "nope"
        ));
    }

    fn assert_malformed(text: &str) {
        match Model::parse(text) {
            Err(DaeError::MalformedModel(_)) => {}
            other => panic!("expected MalformedModel, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_models() {
        // undeclared reference
        assert_malformed("state x\nequation der(x) = -k*x");
        // unrecognized role
        assert_malformed("gizmo x\nstate y\nequation der(y) = 1");
        // duplicate name
        assert_malformed("state x\nparameter x\nequation der(x) = 1");
        // differential count
        assert_malformed("state x\nstate y\nequation der(x) = y");
        // algebraic count
        assert_malformed("state x\nalgebraic z\nequation der(x) = -x");
        // derivative of a non-state
        assert_malformed("parameter k\nderivative der(k)");
        // missing binding
        assert_malformed("dependent y\nstate x\nequation der(x) = 1");
        // dependent parameter depending on a state
        assert_malformed("state x\ndependent_parameter q = 2*x\nequation der(x) = q");
        // binding cycle
        assert_malformed(
            "parameter k\ndependent_parameter a = b + k\ndependent_parameter b = a\nstate x\nequation der(x) = a",
        );
    }

    #[test]
    fn test_explicit_derivative_declaration() {
        let model = Model::parse("state x\nderivative der(x)\nequation der(x) = 1").unwrap();
        assert_eq!(model.derivatives().len(), 1);
        assert_eq!(model.variables().len(), 3);
    }
}
