//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 敏感信息脱敏工具
//!
//! 连接串中的密码和用户邮箱不能原样写入日志。

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// 匹配 `scheme://user:password@` 中的凭据部分
    static ref URL_CREDENTIALS: Regex =
        Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*://)(?P<user>[^:@/]*):[^@/]*@")
            .expect("credential pattern is valid");
}

/// 脱敏敏感信息
///
/// 返回格式为 `****{last_chars}`；值太短时完全隐藏。
pub fn redact_value(value: &str, visible_chars: usize) -> String {
    let len = value.chars().count();
    if len <= visible_chars {
        "*".repeat(len)
    } else {
        let tail: String = value.chars().skip(len - visible_chars).collect();
        format!("****{}", tail)
    }
}

/// 脱敏连接字符串
///
/// # 示例
/// ```
/// use usercache::utils::redaction::redact_connection_string;
/// assert_eq!(
///     redact_connection_string("postgres://app:hunter2@db:5432/users"),
///     "postgres://app:****@db:5432/users"
/// );
/// ```
pub fn redact_connection_string(connection_string: &str) -> String {
    URL_CREDENTIALS
        .replace(connection_string, "${scheme}${user}:****@")
        .into_owned()
}

/// 脱敏邮箱地址，只保留首字母和域名
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => redact_value(email, 2),
    }
}
