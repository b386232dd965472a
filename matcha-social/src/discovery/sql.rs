//! Renders a [`DiscoveryPlan`] into PostgreSQL text plus ordered binds.
//!
//! The text is assembled only from fixed fragments and whitelisted column
//! expressions; every operand becomes a numbered placeholder.

use std::fmt::Write as _;

use uuid::Uuid;

use super::filter::{Direction, DiscoveryPlan, Field, FieldKind, Predicate, Scalar};

#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Uuid(Uuid),
    BigInt(i64),
    Double(f64),
    Text(String),
    BigIntList(Vec<i64>),
    TextList(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub text: String,
    pub binds: Vec<BindValue>,
}

struct Builder {
    text: String,
    binds: Vec<BindValue>,
}

impl Builder {
    fn bind(&mut self, value: BindValue) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }
}

fn column(field: Field) -> &'static str {
    match field {
        Field::Age => "c.age",
        Field::Gender => "c.gender",
        Field::SexualPreference => "c.sexual_preference",
        Field::Distance => "c.distance_km",
        Field::FameRating => "c.fame_rating",
        Field::CommonInterests => "c.common_interests",
        Field::Username => "c.username",
        Field::Email => "c.email",
    }
}

fn scalar_bind(value: &Scalar) -> BindValue {
    match value {
        Scalar::Int(v) => BindValue::BigInt(*v),
        Scalar::Text(v) => BindValue::Text(v.clone()),
    }
}

/// The array type follows the column, so an empty list still binds as the
/// right element type.
fn list_bind(field: Field, values: &[Scalar]) -> BindValue {
    match field.kind() {
        FieldKind::Integer => BindValue::BigIntList(
            values
                .iter()
                .filter_map(|v| match v {
                    Scalar::Int(i) => Some(*i),
                    Scalar::Text(_) => None,
                })
                .collect(),
        ),
        FieldKind::Text | FieldKind::Geo => BindValue::TextList(
            values
                .iter()
                .map(|v| match v {
                    Scalar::Int(i) => i.to_string(),
                    Scalar::Text(t) => t.clone(),
                })
                .collect(),
        ),
    }
}

pub fn render(plan: &DiscoveryPlan) -> Statement {
    let mut b = Builder { text: String::with_capacity(2048), binds: Vec::new() };
    let me = b.bind(BindValue::Uuid(plan.requester));

    let distance = match plan.origin {
        Some(origin) => {
            let lat = b.bind(BindValue::Double(origin.lat));
            let lng = b.bind(BindValue::Double(origin.lng));
            format!(
                "CASE WHEN p.latitude IS NULL OR p.longitude IS NULL THEN NULL \
                 ELSE 2 * 6371.0 * asin(sqrt(\
                 power(sin(radians(p.latitude - {lat}) / 2), 2) + \
                 cos(radians({lat})) * cos(radians(p.latitude)) * \
                 power(sin(radians(p.longitude - {lng}) / 2), 2))) END"
            )
        }
        None => "CAST(NULL AS DOUBLE PRECISION)".to_string(),
    };

    let _ = write!(
        b.text,
        "SELECT c.* FROM (\
         SELECT p.id, p.username, p.email, p.first_name, p.last_name, p.gender, \
         p.sexual_preference, p.age, p.biography, p.fame_rating, p.latitude, p.longitude, \
         p.last_seen_at, \
         ({distance}) AS distance_km, \
         (SELECT COUNT(*) FROM profile_interests pi WHERE pi.profile_id = p.id \
         AND pi.tag IN (SELECT ri.tag FROM profile_interests ri WHERE ri.profile_id = {me})) AS common_interests, \
         ARRAY(SELECT t.tag::text FROM profile_interests t WHERE t.profile_id = p.id ORDER BY t.tag) AS interests \
         FROM profiles p \
         WHERE p.id <> {me} \
         AND NOT EXISTS (SELECT 1 FROM likes l WHERE l.liker_id = {me} AND l.likee_id = p.id) \
         AND NOT EXISTS (SELECT 1 FROM blocks bl WHERE (bl.blocker_id = {me} AND bl.blocked_id = p.id) \
         OR (bl.blocker_id = p.id AND bl.blocked_id = {me}))\
         ) AS c WHERE TRUE"
    );

    for predicate in &plan.predicates {
        let clause = match predicate {
            Predicate::Compare { field, op, value } => {
                let slot = b.bind(scalar_bind(value));
                format!("{} {} {slot}", column(*field), op.sql())
            }
            Predicate::Membership { field, values, negated } => {
                let slot = b.bind(list_bind(*field, values));
                let test = format!("{} = ANY({slot})", column(*field));
                if *negated {
                    format!("NOT ({test})")
                } else {
                    test
                }
            }
            Predicate::WithinRadius { km } => {
                let slot = b.bind(BindValue::Double(*km));
                format!("c.distance_km IS NOT NULL AND c.distance_km <= {slot}")
            }
        };
        let _ = write!(b.text, " AND ({clause})");
    }

    b.text.push_str(" ORDER BY ");
    for key in &plan.order {
        let direction = match key.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        let _ = write!(b.text, "{} {direction} NULLS LAST, ", column(key.field));
    }
    b.text.push_str("c.id ASC");

    let limit = b.bind(BindValue::BigInt(plan.limit));
    let _ = write!(b.text, " LIMIT {limit}");

    Statement { text: b.text, binds: b.binds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::filter::{compile, LimitBounds};
    use crate::models::Profile;
    use serde_json::json;

    fn requester() -> Profile {
        Profile {
            id: Uuid::new_v4(),
            username: "me".into(),
            email: "me@example.com".into(),
            first_name: "M".into(),
            last_name: "E".into(),
            gender: "male".into(),
            sexual_preference: "female".into(),
            age: 30,
            biography: None,
            fame_rating: 3,
            latitude: Some(45.76),
            longitude: Some(4.83),
            interests: vec!["hiking".into()],
            last_seen_at: None,
        }
    }

    #[test]
    fn operands_never_reach_the_statement_text() {
        let hostile = "x'; DROP TABLE profiles; --";
        let filter = json!({ "username": { "$eq": hostile }, "gender": { "$nin": ["a'b"] } });
        let plan = compile(&requester(), Some(&filter), None, None, LimitBounds::default()).unwrap();
        let statement = render(&plan);

        assert!(!statement.text.contains("DROP TABLE"));
        assert!(!statement.text.contains("a'b"));
        assert!(statement.binds.contains(&BindValue::Text(hostile.into())));
        assert!(statement.binds.contains(&BindValue::TextList(vec!["a'b".into()])));
    }

    #[test]
    fn placeholders_are_numbered_in_bind_order() {
        let filter = json!({ "age": { "$gte": 22 }, "distance": { "$near": 10 } });
        let sort = json!([{ "age": "asc" }]);
        let plan = compile(&requester(), Some(&filter), Some(&sort), Some(5), LimitBounds::default()).unwrap();
        let statement = render(&plan);

        // requester, origin lat, origin lng, age, radius, limit
        assert_eq!(statement.binds.len(), 6);
        assert_eq!(statement.binds[3], BindValue::BigInt(22));
        assert_eq!(statement.binds[4], BindValue::Double(10.0));
        assert_eq!(statement.binds[5], BindValue::BigInt(5));
        assert!(statement.text.contains("c.age >= $4"));
        assert!(statement.text.contains("c.distance_km <= $5"));
        assert!(statement.text.ends_with("ORDER BY c.age ASC NULLS LAST, c.id ASC LIMIT $6"));
    }

    #[test]
    fn default_order_ends_with_the_id_tie_breaker() {
        let plan = compile(&requester(), None, None, None, LimitBounds::default()).unwrap();
        let statement = render(&plan);
        assert!(statement.text.contains(
            "ORDER BY c.common_interests DESC NULLS LAST, c.distance_km ASC NULLS LAST, \
             c.fame_rating DESC NULLS LAST, c.id ASC"
        ));
    }

    #[test]
    fn missing_origin_renders_a_null_distance() {
        let mut me = requester();
        me.latitude = None;
        let plan = compile(&me, None, None, None, LimitBounds::default()).unwrap();
        let statement = render(&plan);
        assert!(statement.text.contains("CAST(NULL AS DOUBLE PRECISION)"));
        assert_eq!(statement.binds[0], BindValue::Uuid(me.id));
        assert_eq!(statement.binds.len(), 2);
    }

    #[test]
    fn integer_membership_binds_an_integer_array() {
        let filter = json!({ "age": { "$in": [20, 25] } });
        let plan = compile(&requester(), Some(&filter), None, None, LimitBounds::default()).unwrap();
        let statement = render(&plan);
        assert!(statement.binds.contains(&BindValue::BigIntList(vec![20, 25])));
        assert!(statement.text.contains("c.age = ANY($4)"));
    }

    #[test]
    fn empty_membership_binds_the_column_type() {
        let filter = json!({ "gender": { "$in": [] }, "age": { "$nin": [] } });
        let plan = compile(&requester(), Some(&filter), None, None, LimitBounds::default()).unwrap();
        let statement = render(&plan);
        assert!(statement.binds.contains(&BindValue::TextList(vec![])));
        assert!(statement.binds.contains(&BindValue::BigIntList(vec![])));
        assert!(statement.text.contains("c.gender = ANY($4)"));
        assert!(statement.text.contains("NOT (c.age = ANY($5))"));
    }
}
