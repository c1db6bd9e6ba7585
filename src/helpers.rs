//! 适配层常用帮助函数：金额换算、卡号掩码匹配、回单匹配、按时间排序

use regex::Regex;
use serde_json::Value;

use crate::core::TransferRequest;

/// 元转分（四舍五入）
pub fn amount_to_fen(yuan: f64) -> i64 {
    (yuan * 100.0).round() as i64
}

pub fn amount_to_yuan(fen: i64) -> f64 {
    fen as f64 / 100.0
}

pub fn amount_to_yuan_str(fen: i64) -> String {
    format!("{:.2}", amount_to_yuan(fen))
}

/// 掩码匹配：连续的掩码字符（默认 `*` 与空格）匹配任意位数字，从目标开头匹配
pub fn is_match_num_mask(mask: &str, target: &str, mask_chars: &[char]) -> bool {
    if mask.is_empty() {
        return false;
    }
    let mut pattern = String::from("^");
    let mut in_mask = false;
    for ch in mask.chars() {
        if mask_chars.contains(&ch) {
            in_mask = true;
            continue;
        }
        if in_mask {
            pattern.push_str(r"\d*");
            in_mask = false;
        }
        pattern.push_str(&regex::escape(&ch.to_string()));
    }
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(target),
        Err(e) => {
            tracing::warn!(error = %e, mask, "invalid mask pattern");
            false
        }
    }
}

/// 卡号掩码匹配，如 `6217****4869`
pub fn is_match_card_num(card_mask: &str, card: &str) -> bool {
    is_match_num_mask(card_mask, card, &['*', ' '])
}

/// 卡号尾号匹配
pub fn is_match_card_num_tail(tail: &str, card: &str) -> bool {
    if tail.is_empty() {
        return false;
    }
    is_match_card_num(&format!("*{tail}"), card)
}

/// 回单是否对应该笔转账：户名、金额、账号一致，附言仅在转账带附言时比较
pub fn is_transfer_receipt(receipt: &Value, request: &TransferRequest) -> bool {
    let str_field = |key: &str| receipt.get(key).and_then(Value::as_str).unwrap_or_default();
    let postscript_ok = request.postscript.is_empty() || str_field("postscript") == request.postscript;
    str_field("name") == request.holder
        && receipt.get("amount").and_then(Value::as_i64) == Some(request.amount)
        && str_field("customerAccount") == request.account
        && postscript_ok
}

/// 按 `time` 字段倒序排列（`%Y-%m-%d %H:%M:%S` 字符串可直接比较）
pub fn sort_by_time_desc(records: &mut [Value]) {
    records.sort_by(|a, b| {
        let ta = a.get("time").and_then(Value::as_str).unwrap_or_default();
        let tb = b.get("time").and_then(Value::as_str).unwrap_or_default();
        tb.cmp(ta)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_conversions() {
        assert_eq!(amount_to_fen(1.01), 101);
        assert_eq!(amount_to_fen(0.1 + 0.2), 30);
        assert_eq!(amount_to_yuan_str(12345), "123.45");
    }

    #[test]
    fn test_card_mask() {
        assert!(is_match_card_num("6217****4869", "62178526000283544869"));
        assert!(is_match_card_num("6217 **** 4869", "62171234869"));
        assert!(!is_match_card_num("6218****4869", "62178526000283544869"));
        assert!(!is_match_card_num("", "6217"));
    }

    #[test]
    fn test_card_tail() {
        assert!(is_match_card_num_tail("4869", "6217852600028354869"));
        assert!(!is_match_card_num_tail("", "6217"));
    }

    #[test]
    fn test_is_transfer_receipt() {
        let request = TransferRequest {
            order_id: "32422".into(),
            amount: 101,
            account: "6217852600028354869".into(),
            holder: "张三".into(),
            bank_name: String::new(),
            postscript: String::new(),
        };
        let receipt = json!({
            "name": "张三", "amount": 101, "customerAccount": "6217852600028354869", "postscript": "货款"
        });
        assert!(is_transfer_receipt(&receipt, &request));
        let other = json!({"name": "李四", "amount": 101, "customerAccount": "6217852600028354869"});
        assert!(!is_transfer_receipt(&other, &request));
    }

    #[test]
    fn test_sort_by_time_desc() {
        let mut records = vec![
            json!({"time": "2024-01-01 10:00:00"}),
            json!({"time": "2024-01-02 09:00:00"}),
        ];
        sort_by_time_desc(&mut records);
        assert_eq!(records[0]["time"], "2024-01-02 09:00:00");
    }
}
