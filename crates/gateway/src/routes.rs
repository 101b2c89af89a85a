//! # ルートポリシー
//!
//! 署名必須ルートの表。起動時に構築し、リクエストごとには探索しない。
//! キーはaxumのルートテンプレート（例: `/orders/{id}`）。

use std::collections::HashMap;

use axum::http::Method;

/// `(メソッド, ルートテンプレート) → 署名必須か` の表。
/// 登録のないルートは署名不要として素通しする。
#[derive(Debug, Clone, Default)]
pub struct RoutePolicies {
    policies: HashMap<(Method, String), bool>,
}

impl RoutePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// 署名必須として登録する。
    pub fn require(mut self, method: Method, template: &str) -> Self {
        self.policies.insert((method, template.to_string()), true);
        self
    }

    /// 署名不要として明示的に登録する。
    pub fn exempt(mut self, method: Method, template: &str) -> Self {
        self.policies.insert((method, template.to_string()), false);
        self
    }

    pub fn requires_signature(&self, method: &Method, template: &str) -> bool {
        self.policies
            .get(&(method.clone(), template.to_string()))
            .copied()
            .unwrap_or(false)
    }
}
