//! User macros in trigger function parameters.

use indexmap::IndexMap;

use super::MacroResolver;
use crate::patterns::MacroFamily;
use crate::request::FunctionRecord;
use crate::scenario::Scenario;
use crate::substitute::substitute;
use crate::usermacros::{UserMacroRequest, UserMacroResolver};

impl MacroResolver {
    pub(super) async fn resolve_function_field(
        &self,
        mut functions: IndexMap<String, FunctionRecord>,
    ) -> IndexMap<String, FunctionRecord> {
        let matcher = &Scenario::FunctionParameter.config().matcher;

        let mut requests: IndexMap<String, UserMacroRequest> = IndexMap::new();
        for (key, function) in &functions {
            let Some(params) = self.key_params.function_params(&function.parameter) else {
                continue;
            };
            let tokens = matcher.find(MacroFamily::User, params.iter().map(String::as_str));
            if tokens.is_empty() {
                continue;
            }
            requests.insert(
                key.clone(),
                UserMacroRequest {
                    host_ids: vec![function.host_id.clone()],
                    tokens,
                },
            );
        }
        if requests.is_empty() {
            return functions;
        }
        tracing::debug!(functions = requests.len(), "Resolving function parameter macros");

        let mut users = UserMacroResolver::new(self.store.as_ref(), &self.config);
        for (key, resolved) in users.resolve(requests).await {
            if let Some(function) = functions.get_mut(&key) {
                function.parameter = self
                    .key_params
                    .rewrite_function_params(&function.parameter, &|p: &str| {
                        substitute(p, matcher, &resolved)
                    });
            }
        }
        functions
    }
}
