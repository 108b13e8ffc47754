//! Attendance Model (考勤记录 / 扣款)

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use super::timestamp::Timestamp;

/// Clock-in / clock-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceKind {
    In,
    Out,
}

/// Attendance log entry (`attendance` collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceLog {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: AttendanceKind,
    pub timestamp: Timestamp,
}

/// Manual salary deduction (`deductions` collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deduction {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub user_id: String,
    /// Stored either as a number or a numeric string
    #[serde(
        default,
        deserialize_with = "lenient_amount",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// 金额兼容数字和字符串，无法解析时按 0 处理
fn lenient_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let amount = match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(|f| Decimal::try_from(f).ok())
            .unwrap_or(Decimal::ZERO),
        Value::String(s) => Decimal::from_str(s.trim()).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    };
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deduction(amount: Value) -> Deduction {
        serde_json::from_value(serde_json::json!({ "userId": "u1", "amount": amount })).unwrap()
    }

    #[test]
    fn test_amount_accepts_number_and_string() {
        assert_eq!(deduction(serde_json::json!(50)).amount, Decimal::from(50));
        assert_eq!(deduction(serde_json::json!("100")).amount, Decimal::from(100));
        assert_eq!(
            deduction(serde_json::json!("12.5")).amount,
            Decimal::new(125, 1)
        );
    }

    #[test]
    fn test_amount_garbage_is_zero() {
        assert_eq!(deduction(serde_json::json!("abc")).amount, Decimal::ZERO);
        assert_eq!(deduction(Value::Null).amount, Decimal::ZERO);
    }

    #[test]
    fn test_log_kind_wire_name() {
        let log: AttendanceLog = serde_json::from_value(serde_json::json!({
            "userId": "u1",
            "type": "in",
            "timestamp": { "seconds": 10 }
        }))
        .unwrap();
        assert_eq!(log.kind, AttendanceKind::In);
    }
}
