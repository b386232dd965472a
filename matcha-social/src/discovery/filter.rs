//! Filter/sort expression tree and its compiler.
//!
//! Input is the declarative JSON the client sends; output is a typed
//! [`DiscoveryPlan`]. Every field is checked against a whitelist and every
//! operator against the field's operator set before anything reaches storage.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{GeoPoint, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Age,
    Gender,
    SexualPreference,
    Distance,
    FameRating,
    CommonInterests,
    Username,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    Geo,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Age,
        Field::Gender,
        Field::SexualPreference,
        Field::Distance,
        Field::FameRating,
        Field::CommonInterests,
        Field::Username,
        Field::Email,
    ];

    pub fn parse(name: &str) -> Option<Field> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Age => "age",
            Field::Gender => "gender",
            Field::SexualPreference => "sexual_preference",
            Field::Distance => "distance",
            Field::FameRating => "fame_rating",
            Field::CommonInterests => "common_interests",
            Field::Username => "username",
            Field::Email => "email",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Age | Field::FameRating | Field::CommonInterests => FieldKind::Integer,
            Field::Gender | Field::SexualPreference | Field::Username | Field::Email => FieldKind::Text,
            Field::Distance => FieldKind::Geo,
        }
    }

    pub fn allows(&self, op: Operator) -> bool {
        match self.kind() {
            FieldKind::Integer => op != Operator::Near,
            FieldKind::Text => matches!(op, Operator::Eq | Operator::Ne | Operator::In | Operator::Nin),
            FieldKind::Geo => op == Operator::Near,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Near,
}

impl Operator {
    pub fn parse(token: &str) -> Option<Operator> {
        Some(match token {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$in" => Operator::In,
            "$nin" => Operator::Nin,
            "$near" => Operator::Near,
            _ => return None,
        })
    }

    fn comparison(&self) -> Option<Comparison> {
        Some(match self {
            Operator::Eq => Comparison::Eq,
            Operator::Ne => Comparison::Ne,
            Operator::Lt => Comparison::Lt,
            Operator::Lte => Comparison::Lte,
            Operator::Gt => Comparison::Gt,
            Operator::Gte => Comparison::Gte,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { field: Field, op: Comparison, value: Scalar },
    Membership { field: Field, values: Vec<Scalar>, negated: bool },
    WithinRadius { km: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: Field,
    pub direction: Direction,
}

/// Order used when the client sends no sort specification.
pub const DEFAULT_ORDER: [SortKey; 3] = [
    SortKey { field: Field::CommonInterests, direction: Direction::Desc },
    SortKey { field: Field::Distance, direction: Direction::Asc },
    SortKey { field: Field::FameRating, direction: Direction::Desc },
];

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryPlan {
    pub requester: Uuid,
    pub origin: Option<GeoPoint>,
    pub predicates: Vec<Predicate>,
    pub order: Vec<SortKey>,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct LimitBounds {
    pub default: i64,
    pub max: i64,
}

impl Default for LimitBounds {
    fn default() -> Self {
        Self { default: 20, max: 100 }
    }
}

fn filter_error(message: impl Into<String>, details: Value) -> AppError {
    AppError::with_details(ErrorCode::InvalidFilter, message, details)
}

fn sort_error(message: impl Into<String>, details: Value) -> AppError {
    AppError::with_details(ErrorCode::InvalidSort, message, details)
}

/// Accept either a JSON document or a JSON-encoded string of one.
fn decode(raw: Option<&Value>, error: fn(String, Value) -> AppError) -> AppResult<Option<Value>> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text)
            .map(Some)
            .map_err(|e| error(format!("malformed specification: {e}"), json!({ "reason": "syntax" }))),
        Some(other) => Ok(Some(other.clone())),
    }
}

/// Compile raw filter/sort/limit input into a plan for `requester`.
pub fn compile(
    requester: &Profile,
    filter: Option<&Value>,
    sort: Option<&Value>,
    limit: Option<i64>,
    bounds: LimitBounds,
) -> AppResult<DiscoveryPlan> {
    let predicates = match decode(filter, |m, d| filter_error(m, d))? {
        Some(doc) => compile_filter(&doc)?,
        None => Vec::new(),
    };
    let (order, client_sort) = match decode(sort, |m, d| sort_error(m, d))? {
        Some(doc) => (compile_sort(&doc)?, true),
        None => (DEFAULT_ORDER.to_vec(), false),
    };

    let limit = limit.unwrap_or(bounds.default);
    if !(1..=bounds.max).contains(&limit) {
        return Err(AppError::with_details(
            ErrorCode::ValidationError,
            format!("limit must be between 1 and {}", bounds.max),
            json!({ "field": "limit", "value": limit }),
        ));
    }

    let origin = requester.location();
    let uses_distance = predicates.iter().any(|p| matches!(p, Predicate::WithinRadius { .. }))
        || (client_sort && order.iter().any(|k| k.field == Field::Distance));
    if uses_distance && origin.is_none() {
        return Err(AppError::with_details(
            ErrorCode::LocationRequired,
            "distance requires a stored location for the requester",
            json!({ "field": "distance" }),
        ));
    }

    Ok(DiscoveryPlan {
        requester: requester.id,
        origin,
        predicates,
        order,
        limit,
    })
}

fn compile_filter(doc: &Value) -> AppResult<Vec<Predicate>> {
    let fields = doc
        .as_object()
        .ok_or_else(|| filter_error("filter must be an object", json!({ "reason": "syntax" })))?;

    let mut predicates = Vec::new();
    for (name, condition) in fields {
        let field = Field::parse(name)
            .ok_or_else(|| filter_error(format!("unknown filter field '{name}'"), json!({ "field": name })))?;

        match condition {
            Value::Object(ops) => {
                if ops.is_empty() {
                    return Err(filter_error(
                        format!("no operator given for '{name}'"),
                        json!({ "field": name }),
                    ));
                }
                for (token, operand) in ops {
                    predicates.push(compile_operator(field, token, operand)?);
                }
            }
            // Bare scalar is shorthand for $eq.
            scalar => predicates.push(compile_operator(field, "$eq", scalar)?),
        }
    }
    Ok(predicates)
}

fn compile_operator(field: Field, token: &str, operand: &Value) -> AppResult<Predicate> {
    let name = field.name();
    let op = Operator::parse(token).ok_or_else(|| {
        filter_error(format!("unknown operator '{token}'"), json!({ "field": name, "operator": token }))
    })?;
    if !field.allows(op) {
        return Err(filter_error(
            format!("operator '{token}' is not allowed on '{name}'"),
            json!({ "field": name, "operator": token }),
        ));
    }

    let bad_operand = |expected: &str| {
        filter_error(
            format!("'{name}' {token} expects {expected}"),
            json!({ "field": name, "operator": token }),
        )
    };

    match op {
        Operator::Near => {
            let km = operand.as_f64().filter(|km| km.is_finite() && *km > 0.0);
            km.map(|km| Predicate::WithinRadius { km })
                .ok_or_else(|| bad_operand("a positive radius in km"))
        }
        Operator::In | Operator::Nin => {
            let items = operand.as_array().ok_or_else(|| bad_operand("an array"))?;
            let values = items
                .iter()
                .map(|v| scalar_for(field, v))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| bad_operand(operand_kind(field)))?;
            Ok(Predicate::Membership { field, values, negated: op == Operator::Nin })
        }
        _ => {
            let value = scalar_for(field, operand).ok_or_else(|| bad_operand(operand_kind(field)))?;
            let op = op.comparison().ok_or_else(|| bad_operand(operand_kind(field)))?;
            Ok(Predicate::Compare { field, op, value })
        }
    }
}

fn operand_kind(field: Field) -> &'static str {
    match field.kind() {
        FieldKind::Integer => "an integer",
        FieldKind::Text => "a string",
        FieldKind::Geo => "a radius",
    }
}

fn scalar_for(field: Field, value: &Value) -> Option<Scalar> {
    match field.kind() {
        FieldKind::Integer => value.as_i64().map(Scalar::Int),
        FieldKind::Text => value.as_str().map(|s| Scalar::Text(s.to_string())),
        FieldKind::Geo => None,
    }
}

fn compile_sort(doc: &Value) -> AppResult<Vec<SortKey>> {
    let mut entries: Vec<(String, Value)> = Vec::new();
    match doc {
        Value::Object(map) => collect_sort_entries(map, &mut entries),
        Value::Array(items) => {
            for item in items {
                let map = item.as_object().ok_or_else(|| {
                    sort_error("sort entries must be objects", json!({ "reason": "syntax" }))
                })?;
                collect_sort_entries(map, &mut entries);
            }
        }
        _ => return Err(sort_error("sort must be an object or an array", json!({ "reason": "syntax" }))),
    }

    let mut keys = Vec::with_capacity(entries.len());
    for (name, direction) in entries {
        let field = Field::parse(&name)
            .ok_or_else(|| sort_error(format!("unknown sort field '{name}'"), json!({ "field": name })))?;
        let direction = match direction.as_str().map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => Direction::Asc,
            Some("desc") => Direction::Desc,
            _ => {
                return Err(sort_error(
                    format!("sort direction for '{name}' must be 'asc' or 'desc'"),
                    json!({ "field": name }),
                ))
            }
        };
        if keys.iter().any(|k: &SortKey| k.field == field) {
            return Err(sort_error(format!("'{name}' is sorted twice"), json!({ "field": name })));
        }
        keys.push(SortKey { field, direction });
    }
    Ok(keys)
}

fn collect_sort_entries(map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    out.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
}

/// A candidate as seen by the plan: the profile plus the two values computed
/// relative to the requester.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub profile: &'a Profile,
    pub distance_km: Option<f64>,
    pub common_interests: i64,
}

impl Candidate<'_> {
    fn integer(&self, field: Field) -> Option<i64> {
        match field {
            Field::Age => Some(self.profile.age as i64),
            Field::FameRating => Some(self.profile.fame_rating as i64),
            Field::CommonInterests => Some(self.common_interests),
            _ => None,
        }
    }

    fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Gender => Some(&self.profile.gender),
            Field::SexualPreference => Some(&self.profile.sexual_preference),
            Field::Username => Some(&self.profile.username),
            Field::Email => Some(&self.profile.email),
            _ => None,
        }
    }

    fn compare_to(&self, field: Field, value: &Scalar) -> Option<Ordering> {
        match value {
            Scalar::Int(v) => self.integer(field).map(|own| own.cmp(v)),
            Scalar::Text(v) => self.text(field).map(|own| own.cmp(v.as_str())),
        }
    }
}

impl Predicate {
    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        match self {
            Predicate::Compare { field, op, value } => candidate
                .compare_to(*field, value)
                .is_some_and(|ordering| op.holds(ordering)),
            Predicate::Membership { field, values, negated } => {
                let found = values
                    .iter()
                    .any(|v| candidate.compare_to(*field, v) == Some(Ordering::Equal));
                found != *negated
            }
            Predicate::WithinRadius { km } => candidate.distance_km.is_some_and(|d| d <= *km),
        }
    }
}

impl DiscoveryPlan {
    /// Ordering the store must honour: requested keys in order, nulls last,
    /// then id as the final tie-break.
    pub fn compare(&self, a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
        for key in &self.order {
            let ordering = match key.field.kind() {
                FieldKind::Geo => match (a.distance_km, b.distance_km) {
                    (Some(x), Some(y)) => directed(x.total_cmp(&y), key.direction),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
                FieldKind::Integer => directed(a.integer(key.field).cmp(&b.integer(key.field)), key.direction),
                FieldKind::Text => directed(a.text(key.field).cmp(&b.text(key.field)), key.direction),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.profile.id.cmp(&b.profile.id)
    }

    pub fn admits(&self, candidate: &Candidate<'_>) -> bool {
        self.predicates.iter().all(|p| p.matches(candidate))
    }
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requester(located: bool) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            username: "requester".into(),
            email: "requester@example.com".into(),
            first_name: "Re".into(),
            last_name: "Quester".into(),
            gender: "female".into(),
            sexual_preference: "male".into(),
            age: 27,
            biography: None,
            fame_rating: 0,
            latitude: located.then_some(48.85),
            longitude: located.then_some(2.35),
            interests: vec![],
            last_seen_at: None,
        }
    }

    fn compile_filter_doc(filter: Value) -> AppResult<DiscoveryPlan> {
        compile(&requester(true), Some(&filter), None, None, LimitBounds::default())
    }

    fn error_code(result: AppResult<DiscoveryPlan>) -> ErrorCode {
        result.unwrap_err().code()
    }

    #[test]
    fn operators_compile_to_typed_predicates() {
        let plan = compile_filter_doc(json!({
            "age": { "$gte": 22, "$lt": 40 },
            "gender": { "$in": ["male", "female"] },
            "distance": { "$near": 25 }
        }))
        .unwrap();

        assert_eq!(
            plan.predicates,
            vec![
                Predicate::Compare { field: Field::Age, op: Comparison::Gte, value: Scalar::Int(22) },
                Predicate::Compare { field: Field::Age, op: Comparison::Lt, value: Scalar::Int(40) },
                Predicate::Membership {
                    field: Field::Gender,
                    values: vec![Scalar::Text("male".into()), Scalar::Text("female".into())],
                    negated: false,
                },
                Predicate::WithinRadius { km: 25.0 },
            ]
        );
        assert_eq!(plan.limit, 20);
        assert_eq!(plan.order, DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn bare_scalar_means_equality() {
        let plan = compile_filter_doc(json!({ "gender": "male" })).unwrap();
        assert_eq!(
            plan.predicates,
            vec![Predicate::Compare { field: Field::Gender, op: Comparison::Eq, value: Scalar::Text("male".into()) }]
        );
    }

    #[test]
    fn unknown_field_is_named_in_the_error() {
        let err = compile_filter_doc(json!({ "height": { "$gt": 180 } })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFilter);
        assert_eq!(err.details().unwrap()["field"], "height");
    }

    #[test]
    fn location_field_only_accepts_the_geo_operator() {
        let err = compile_filter_doc(json!({ "distance": { "$lte": 10 } })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFilter);
        assert_eq!(err.details().unwrap()["operator"], "$lte");

        let err = compile_filter_doc(json!({ "age": { "$near": 10 } })).unwrap_err();
        assert_eq!(err.details().unwrap()["field"], "age");
    }

    #[test]
    fn text_fields_reject_range_operators() {
        assert_eq!(error_code(compile_filter_doc(json!({ "username": { "$gt": "m" } }))), ErrorCode::InvalidFilter);
    }

    #[test]
    fn operand_types_are_checked() {
        assert_eq!(error_code(compile_filter_doc(json!({ "age": { "$gte": "22" } }))), ErrorCode::InvalidFilter);
        assert_eq!(error_code(compile_filter_doc(json!({ "age": { "$in": 22 } }))), ErrorCode::InvalidFilter);
        assert_eq!(error_code(compile_filter_doc(json!({ "distance": { "$near": -5 } }))), ErrorCode::InvalidFilter);
        assert_eq!(error_code(compile_filter_doc(json!({ "age": {} }))), ErrorCode::InvalidFilter);
    }

    #[test]
    fn malformed_string_takes_the_validation_path() {
        let raw = Value::String("{\"age\": {\"$gte\": 22".into());
        let err = compile(&requester(true), Some(&raw), None, None, LimitBounds::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFilter);
    }

    #[test]
    fn encoded_string_filter_is_accepted() {
        let raw = Value::String("{\"age\": {\"$gte\": 22}}".into());
        let plan = compile(&requester(true), Some(&raw), None, None, LimitBounds::default()).unwrap();
        assert_eq!(plan.predicates.len(), 1);
    }

    #[test]
    fn sort_keeps_client_order() {
        let sort = json!({ "fame_rating": "desc", "age": "asc" });
        let plan = compile(&requester(true), None, Some(&sort), None, LimitBounds::default()).unwrap();
        assert_eq!(
            plan.order,
            vec![
                SortKey { field: Field::FameRating, direction: Direction::Desc },
                SortKey { field: Field::Age, direction: Direction::Asc },
            ]
        );

        let sort = json!([{ "age": "ASC" }, { "username": "desc" }]);
        let plan = compile(&requester(true), None, Some(&sort), None, LimitBounds::default()).unwrap();
        assert_eq!(plan.order[0], SortKey { field: Field::Age, direction: Direction::Asc });
        assert_eq!(plan.order[1].field, Field::Username);
    }

    #[test]
    fn bad_sort_direction_is_rejected() {
        let sort = json!({ "age": "up" });
        let err = compile(&requester(true), None, Some(&sort), None, LimitBounds::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSort);
        assert_eq!(err.details().unwrap()["field"], "age");
    }

    #[test]
    fn distance_needs_a_requester_location() {
        let filter = json!({ "distance": { "$near": 10 } });
        let err = compile(&requester(false), Some(&filter), None, None, LimitBounds::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LocationRequired);

        // The default order mentions distance but must not require a location,
        // including when the sort is given as null or a blank string.
        assert!(compile(&requester(false), None, None, None, LimitBounds::default()).is_ok());
        for blank in [Value::Null, json!(""), json!("   ")] {
            let plan = compile(&requester(false), None, Some(&blank), None, LimitBounds::default()).unwrap();
            assert_eq!(plan.order, DEFAULT_ORDER.to_vec());
        }
    }

    #[test]
    fn limit_is_bounded() {
        let me = requester(true);
        assert!(compile(&me, None, None, Some(0), LimitBounds::default()).is_err());
        assert!(compile(&me, None, None, Some(101), LimitBounds::default()).is_err());
        assert_eq!(compile(&me, None, None, Some(100), LimitBounds::default()).unwrap().limit, 100);
    }

    #[test]
    fn predicates_evaluate_against_candidates() {
        let mut other = requester(true);
        other.age = 25;
        other.gender = "male".into();
        let candidate = Candidate { profile: &other, distance_km: Some(12.0), common_interests: 2 };

        let plan = compile_filter_doc(json!({
            "age": { "$gte": 22 },
            "gender": { "$nin": ["female"] },
            "common_interests": { "$gte": 1 },
            "distance": { "$near": 15 }
        }))
        .unwrap();
        assert!(plan.admits(&candidate));

        let far = Candidate { profile: &other, distance_km: Some(40.0), common_interests: 2 };
        assert!(!plan.admits(&far));
        let unknown = Candidate { profile: &other, distance_km: None, common_interests: 2 };
        assert!(!plan.admits(&unknown));
    }
}
