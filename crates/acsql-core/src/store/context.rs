//! Module: store::context
//! Responsibility: physical-predicate atoms, store don't-cares and query
//! document rendering for the document-store compiler.
//! Does not own: clause semantics (see `synth::clause`) or field mapping
//! (see `store::schema`).
//! Boundary: one context per compiled filter.

use crate::{
    error::{ErrorOrigin, InternalError},
    expr::{CaseFold, CompareOp, Expr, Literal, compare_values, like::LikePattern},
    normalize::linear_form,
    store::{
        physical::{Physical, PhysicalValue, compare_type},
        schema::{Collection, Field, PhysicalType, StoreConfig, get_param},
    },
    synth::{
        context::{Context, order_dc},
        espresso::Policy,
        sop::{Cube, Lit, Sop, is_negated, lit, var_of},
    },
};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};

// Extended-JSON literal wrappers; documents holding them never merge.
const WRAPPER_KEYS: [&str; 4] = ["$date", "$oid", "$numberLong", "$numberDecimal"];

///
/// StoreContext
///
/// Variables are physical predicates on one collection. Every field touched
/// gets one type-test variable per plausible type, so a field's nullness is
/// the absence of all of them.
///

pub(crate) struct StoreContext<'a> {
    collection: Collection,
    config: &'a StoreConfig,
    atoms: Vec<Physical>,
    index: HashMap<String, u32>,
}

impl<'a> StoreContext<'a> {
    pub(crate) fn new(collection: Collection, config: &'a StoreConfig) -> Self {
        Self {
            collection,
            config,
            atoms: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn var(&mut self, physical: Physical) -> u32 {
        let next = u32::try_from(self.atoms.len()).unwrap_or(u32::MAX);
        *self.index.entry(physical.key()).or_insert_with(|| {
            self.atoms.push(physical);
            next
        })
    }

    fn type_var(&self, path: &str, ty: PhysicalType) -> Option<u32> {
        let key = Physical::Type {
            path: path.to_string(),
            ty,
        }
        .key();

        self.index.get(&key).copied()
    }

    fn field(&self, expr: &Expr) -> Result<Field, InternalError> {
        let Some(path) = expr.param_path() else {
            return Err(InternalError::invalid_query(
                ErrorOrigin::Store,
                format!("store filters compare parameters, got {expr}"),
            ));
        };

        get_param(self.collection, path, self.config)
    }

    fn ensure_types(&mut self, path: &str, types: &[PhysicalType]) {
        for ty in types {
            self.var(Physical::Type {
                path: path.to_string(),
                ty: *ty,
            });
        }
    }

    // None of the given types present on the field.
    fn absent(&mut self, path: &str, types: &[PhysicalType]) -> Sop {
        let lits: Vec<Lit> = types
            .iter()
            .map(|ty| {
                let var = self.var(Physical::Type {
                    path: path.to_string(),
                    ty: *ty,
                });
                lit(var, true)
            })
            .collect();

        Cube::from_lits(lits).map_or_else(Sop::empty, |cube| Sop::from_cubes([cube]))
    }

    fn typed_compare(
        &mut self,
        path: &str,
        types: &[PhysicalType],
        op: CompareOp,
        literal: &Literal,
    ) -> Sop {
        let mut sop = Sop::empty();
        for ty in types {
            for physical in compare_type(path, *ty, op, literal) {
                sop = sop.or(&Sop::from_lit(lit(self.var(physical), false)));
            }
        }

        sop
    }

    // `slope * x + offset op literal`, answered on the numeric types of `x`.
    fn linear_compare(
        &mut self,
        lhs: &Expr,
        op: CompareOp,
        literal: &Literal,
    ) -> Result<Sop, InternalError> {
        let form = linear_form(lhs).ok_or_else(|| {
            InternalError::unsupported(
                ErrorOrigin::Store,
                format!("only linear arithmetic on one parameter compiles, got {lhs}"),
            )
        })?;

        let field = self.field(&form.variable)?;
        let Some(target) = literal.numeric() else {
            // numeric results sort below every text value
            let below = op == CompareOp::Lt;
            return Ok(match field {
                Field::Tag(tag) if below => Sop::from_lit(lit(self.var(Physical::Tag(tag)), false)),
                Field::Value { path, types } if below => {
                    let numeric = numeric_types(&types);
                    self.ensure_types(&path, &types);
                    self.absent(&path, &numeric).complement()
                }
                _ => Sop::empty(),
            });
        };

        match field {
            Field::Tag(tag) => {
                // a present tag reads as true, which is 1
                let value = form.slope + form.offset;
                let holds = value
                    .partial_cmp(&target)
                    .is_some_and(|ordering| op.accepts(ordering));
                Ok(if holds {
                    Sop::from_lit(lit(self.var(Physical::Tag(tag)), false))
                } else {
                    Sop::empty()
                })
            }
            Field::Value { path, types } => {
                let root = if target == 0.0 {
                    form.root
                } else {
                    (target - form.offset) / form.slope
                };
                let op = if form.slope < 0.0 { op.flip() } else { op };
                self.ensure_types(&path, &types);

                Ok(self.typed_compare(&path, &numeric_types(&types), op, &Literal::Number(root)))
            }
        }
    }

    fn lookup(&self, l: Lit) -> Result<&Physical, InternalError> {
        self.atoms
            .get(var_of(l) as usize)
            .ok_or_else(|| InternalError::synth_invariant(format!("unallocated variable {}", var_of(l))))
    }

    fn vars(&self) -> impl Iterator<Item = (u32, &Physical)> {
        (0u32..).zip(&self.atoms)
    }

    // A field holds at most one type; typed predicates imply their type.
    fn type_dc(&self, cubes: &mut Vec<Cube>) {
        let mut by_path: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for (var, physical) in self.vars() {
            match physical {
                Physical::Type { path, .. } => by_path.entry(path.as_str()).or_default().push(var),
                other => {
                    let implied = other
                        .required_type()
                        .and_then(|ty| self.type_var(other.path(), ty));
                    if let Some(type_var) = implied {
                        cubes.extend(Cube::from_lits([lit(var, false), lit(type_var, true)]));
                    }
                }
            }
        }

        for vars in by_path.values() {
            for (i, a) in vars.iter().enumerate() {
                for b in &vars[i + 1..] {
                    cubes.extend(Cube::from_lits([lit(*a, false), lit(*b, false)]));
                }
            }
        }
    }

    fn ordering_dc(&self, cubes: &mut Vec<Cube>) {
        let mut groups: BTreeMap<(&str, PhysicalType), Vec<(u32, CompareOp, &PhysicalValue)>> =
            BTreeMap::new();
        for (var, physical) in self.vars() {
            if let Physical::Compare { path, op, value } = physical {
                groups
                    .entry((path.as_str(), value.physical_type()))
                    .or_default()
                    .push((var, *op, value));
            }
        }

        for ((path, ty), group) in groups {
            let mut points: Vec<&PhysicalValue> = group.iter().map(|(_, _, v)| *v).collect();
            points.sort_by(|a, b| a.cmp_same_type(b));
            points.dedup_by(|a, b| a.cmp_same_type(b).is_eq());
            let atoms: Vec<(u32, CompareOp, usize)> = group
                .iter()
                .map(|(var, op, value)| {
                    let rank = points
                        .iter()
                        .position(|p| p.cmp_same_type(value).is_eq())
                        .unwrap_or(0);
                    (*var, *op, rank)
                })
                .collect();
            let absent = self.type_var(path, ty).map(|v| vec![lit(v, true)]);

            cubes.extend(order_dc(&atoms, absent.as_deref()));
        }
    }

    fn regex_dc(&self, cubes: &mut Vec<Cube>) {
        let regexes: Vec<(u32, &str, Option<CaseFold>, &LikePattern)> = self
            .vars()
            .filter_map(|(var, physical)| match physical {
                Physical::Regex {
                    path,
                    pattern,
                    fold,
                } => Some((var, path.as_str(), *fold, pattern)),
                _ => None,
            })
            .collect();

        for (i, (va, path_a, fold_a, pa)) in regexes.iter().enumerate() {
            for (vb, path_b, fold_b, pb) in &regexes[i + 1..] {
                if path_a != path_b || fold_a != fold_b {
                    continue;
                }
                if pa.contains(pb) {
                    cubes.extend(Cube::from_lits([lit(*vb, false), lit(*va, true)]));
                }
                if pb.contains(pa) {
                    cubes.extend(Cube::from_lits([lit(*va, false), lit(*vb, true)]));
                }
                if pa.is_disjoint(pb) {
                    cubes.extend(Cube::from_lits([lit(*va, false), lit(*vb, false)]));
                }
            }
        }

        for (vc, physical) in self.vars() {
            let Physical::Compare {
                path,
                op: CompareOp::Eq,
                value: PhysicalValue::Text(text),
            } = physical
            else {
                continue;
            };
            for (vr, regex_path, fold, pattern) in &regexes {
                if *regex_path != path.as_str() {
                    continue;
                }
                let folded = fold.map_or_else(|| text.clone(), |f| f.apply(text));
                cubes.extend(Cube::from_lits([
                    lit(vc, false),
                    lit(*vr, pattern.matches(&folded)),
                ]));
            }
        }
    }

    fn render_cube(&self, cube: &Cube) -> Result<Value, InternalError> {
        let mut conditions: Vec<(String, Value)> = Vec::with_capacity(cube.len());
        let mut excluded: Vec<(String, Vec<Value>)> = Vec::new();
        for l in cube.lits() {
            match (self.lookup(*l)?, is_negated(*l)) {
                (Physical::Type { path, ty }, true) => {
                    let alias = Value::String(ty.type_alias().to_string());
                    match excluded.iter_mut().find(|(p, _)| p == path) {
                        Some((_, aliases)) => aliases.push(alias),
                        None => excluded.push((path.clone(), vec![alias])),
                    }
                }
                (physical, negated) => conditions.push(physical.render(negated)),
            }
        }
        for (path, mut aliases) in excluded {
            let types = if aliases.len() == 1 {
                aliases.swap_remove(0)
            } else {
                Value::Array(aliases)
            };
            conditions.push((path, json!({ "$not": { "$type": types } })));
        }

        Ok(merge_conditions(conditions))
    }
}

fn numeric_types(types: &[PhysicalType]) -> Vec<PhysicalType> {
    types.iter().copied().filter(|ty| !ty.is_text()).collect()
}

fn is_wrapper(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|doc| doc.keys().any(|k| WRAPPER_KEYS.contains(&k.as_str())))
}

// Operator documents on one path, folded into one when that is unambiguous.
fn merge_operators(conditions: &[Value]) -> Option<Value> {
    let mut merged = Map::new();
    for condition in conditions {
        let doc = condition.as_object()?;
        if is_wrapper(condition) {
            return None;
        }
        for (key, operand) in doc {
            if !key.starts_with('$') || merged.contains_key(key) || is_wrapper(operand) {
                return None;
            }
            merged.insert(key.clone(), operand.clone());
        }
    }

    Some(Value::Object(merged))
}

fn merge_conditions(conditions: Vec<(String, Value)>) -> Value {
    let mut grouped: Vec<(String, Vec<Value>)> = Vec::new();
    for (path, condition) in conditions {
        match grouped.iter_mut().find(|(p, _)| *p == path) {
            Some((_, values)) => values.push(condition),
            None => grouped.push((path, vec![condition])),
        }
    }

    let mut parts: Vec<(String, Value)> = Vec::new();
    for (path, mut values) in grouped {
        if values.len() == 1 {
            parts.push((path, values.swap_remove(0)));
        } else if let Some(merged) = merge_operators(&values) {
            parts.push((path, merged));
        } else {
            parts.extend(values.into_iter().map(|v| (path.clone(), v)));
        }
    }

    let mut doc = Map::new();
    let unique = parts.iter().all(|(path, _)| {
        let first = !doc.contains_key(path);
        doc.insert(path.clone(), Value::Null);
        first
    });
    if unique {
        return Value::Object(parts.into_iter().collect());
    }

    let clauses = parts
        .into_iter()
        .map(|(path, condition)| Value::Object(Map::from_iter([(path, condition)])))
        .collect();

    json!({ "$and": Value::Array(clauses) })
}

impl Policy for StoreContext<'_> {}

impl Context for StoreContext<'_> {
    type Output = Value;

    fn compare(&mut self, lhs: &Expr, op: CompareOp, rhs: &Expr) -> Result<Sop, InternalError> {
        let Expr::Literal(literal) = rhs else {
            return Err(InternalError::unsupported(
                ErrorOrigin::Store,
                format!("store filters compare against constants, got {rhs}"),
            ));
        };
        if literal.is_null() {
            return Ok(Sop::empty());
        }
        if matches!(lhs, Expr::Arith { .. }) {
            return self.linear_compare(lhs, op, literal);
        }

        match self.field(lhs)? {
            Field::Tag(tag) => {
                let holds = compare_values(&Literal::Bool(true), literal)
                    .is_some_and(|ordering| op.accepts(ordering));
                let var = self.var(Physical::Tag(tag));
                Ok(if holds {
                    Sop::from_lit(lit(var, false))
                } else {
                    Sop::empty()
                })
            }
            Field::Value { path, types } => {
                self.ensure_types(&path, &types);
                Ok(self.typed_compare(&path, &types, op, literal))
            }
        }
    }

    fn null(&mut self, expr: &Expr) -> Result<Sop, InternalError> {
        let (variable, numeric_only) = match expr {
            Expr::Arith { .. } => {
                let form = linear_form(expr).ok_or_else(|| {
                    InternalError::unsupported(
                        ErrorOrigin::Store,
                        format!("only linear arithmetic on one parameter compiles, got {expr}"),
                    )
                })?;
                (form.variable, true)
            }
            other => (other.clone(), false),
        };

        match self.field(&variable)? {
            Field::Tag(tag) => Ok(Sop::from_lit(lit(self.var(Physical::Tag(tag)), true))),
            Field::Value { path, types } => {
                self.ensure_types(&path, &types);
                let types = if numeric_only {
                    numeric_types(&types)
                } else {
                    types
                };
                Ok(self.absent(&path, &types))
            }
        }
    }

    fn like(
        &mut self,
        lhs: &Expr,
        pattern: &LikePattern,
        fold: Option<CaseFold>,
    ) -> Result<Sop, InternalError> {
        match self.field(lhs)? {
            // tags read as booleans, which never match a pattern
            Field::Tag(_) => Ok(Sop::empty()),
            Field::Value { path, types } => {
                self.ensure_types(&path, &types);
                if !types.contains(&PhysicalType::String) {
                    return Ok(Sop::empty());
                }
                let var = self.var(Physical::Regex {
                    path,
                    pattern: pattern.clone(),
                    fold,
                });
                Ok(Sop::from_lit(lit(var, false)))
            }
        }
    }

    fn dynamic_like(&mut self, expr: &Expr) -> Result<Sop, InternalError> {
        Err(InternalError::unsupported(
            ErrorOrigin::Store,
            format!("LIKE patterns must be constants in store filters, got {expr}"),
        ))
    }

    fn dc(&self) -> Sop {
        let mut cubes = Vec::new();
        self.type_dc(&mut cubes);
        self.ordering_dc(&mut cubes);
        self.regex_dc(&mut cubes);

        Sop::from_cubes(cubes)
    }

    fn variable_count(&self) -> usize {
        self.atoms.len()
    }

    fn render(&self, sop: &Sop) -> Result<Value, InternalError> {
        if sop.is_empty() {
            return Ok(json!({ "$nor": [{}] }));
        }
        if sop.is_universe() {
            return Ok(json!({}));
        }

        let mut cubes = Vec::with_capacity(sop.cubes().len());
        for cube in sop.cubes() {
            cubes.push(self.render_cube(cube)?);
        }

        Ok(if cubes.len() == 1 {
            cubes.swap_remove(0)
        } else {
            json!({ "$or": cubes })
        })
    }
}
