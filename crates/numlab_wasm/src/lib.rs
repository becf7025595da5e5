//! JavaScript bindings for `numlab_core`.
//!
//! Each entry point takes a plain JS object shaped like the matching core request,
//! runs the solve, and returns the tagged result object. Failures come back as a
//! string `JsValue` that names the offending field or the breakdown.
//!
//! Results are written in JSON-compatible form: maps become plain objects and missing
//! values become `null`, so hosts can read every field with ordinary property access.

use anyhow::{anyhow, Context};
use numlab_core::error::NumericResult;
use numlab_core::expression::Expression;
use numlab_core::requests::{
    EvaluateRequest, LinearSystemRequest, Request, RootRequest, SolveResult, VandermondeRequest,
};
use numlab_core::traits::RealFunction;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&Serializer::json_compatible())
}

fn handle<R, F>(request: JsValue, what: &str, solve: F) -> Result<JsValue, JsValue>
where
    R: DeserializeOwned,
    F: FnOnce(R) -> NumericResult<SolveResult>,
{
    console_error_panic_hook::set_once();
    let outcome = from_value::<R>(request)
        .map_err(|e| anyhow!("Invalid {what} request: {e}"))
        .and_then(|request| solve(request).with_context(|| format!("{what} failed")))
        .and_then(|result| to_js(&result).map_err(|e| anyhow!("Serialization error: {e}")));
    outcome.map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

#[wasm_bindgen]
pub fn find_root(request: JsValue) -> Result<JsValue, JsValue> {
    handle(request, "root finding", |request: RootRequest| request.solve())
}

#[wasm_bindgen]
pub fn solve_linear_system(request: JsValue) -> Result<JsValue, JsValue> {
    handle(request, "linear system", |request: LinearSystemRequest| {
        request.solve()
    })
}

#[wasm_bindgen]
pub fn interpolate(request: JsValue) -> Result<JsValue, JsValue> {
    handle(request, "interpolation", |request: VandermondeRequest| {
        request.solve()
    })
}

#[wasm_bindgen]
pub fn evaluate_function(request: JsValue) -> Result<JsValue, JsValue> {
    handle(request, "evaluation", |request: EvaluateRequest| request.solve())
}

/// Dispatches on the request's `kind` field.
#[wasm_bindgen]
pub fn solve(request: JsValue) -> Result<JsValue, JsValue> {
    handle(request, "solve", |request: Request| request.solve())
}

/// A parsed function kept alive on the JS side, for live previews while the user types.
#[wasm_bindgen]
pub struct WasmExpression {
    expression: Expression,
}

#[wasm_bindgen]
impl WasmExpression {
    #[wasm_bindgen(constructor)]
    pub fn new(text: &str) -> Result<WasmExpression, JsValue> {
        console_error_panic_hook::set_once();
        let expression = Expression::parse(text)
            .map_err(|e| JsValue::from_str(&format!("Invalid expression: {e}")))?;
        Ok(WasmExpression { expression })
    }

    pub fn source(&self) -> String {
        self.expression.source().to_string()
    }

    pub fn evaluate(&self, x: f64) -> Result<f64, JsValue> {
        self.expression
            .evaluate_finite(x)
            .map_err(|e| JsValue::from_str(&format!("Evaluation failed: {e}")))
    }

    /// Points where the function is undefined come back with `y: null`.
    pub fn tabulate(&self, start: f64, end: f64, samples: u32) -> Result<JsValue, JsValue> {
        let window = EvaluateRequest {
            expression: None,
            start: Some(start),
            end: Some(end),
            samples: Some(samples as usize),
        };
        let points = window
            .table(&self.expression)
            .map_err(|e| JsValue::from_str(&format!("Tabulation failed: {e}")))?;
        to_js(&points).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::{find_root, interpolate, solve_linear_system, WasmExpression};
    use js_sys::Reflect;
    use serde::Serialize;
    use serde_wasm_bindgen::to_value;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[derive(Serialize)]
    struct NewtonRequest<'a> {
        method: &'a str,
        expression: &'a str,
        derivative: &'a str,
        x0: f64,
        tolerance: f64,
        max_iterations: usize,
    }

    fn property(target: &JsValue, key: &str) -> JsValue {
        Reflect::get(target, &JsValue::from_str(key)).expect("property lookup")
    }

    fn error_message(result: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>) -> String {
        result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default()
    }

    #[wasm_bindgen_test]
    fn find_root_accepts_newton_request() {
        let request = NewtonRequest {
            method: "newton_raphson",
            expression: "x^2 - 2",
            derivative: "2x",
            x0: 1.0,
            tolerance: 1e-7,
            max_iterations: 50,
        };
        let result = find_root(to_value(&request).expect("request")).expect("solve");
        assert_eq!(property(&result, "family").as_string().as_deref(), Some("root"));

        let iterations = property(&result, "iterations");
        let first = Reflect::get(&iterations, &JsValue::from_f64(0.0)).expect("first iteration");
        assert_eq!(property(&first, "index").as_f64(), Some(1.0));
        assert_eq!(property(&first, "kind").as_string().as_deref(), Some("newton"));
        assert!(property(&first, "error").as_f64().is_some());
    }

    #[wasm_bindgen_test]
    fn find_root_reports_missing_derivative() {
        #[derive(Serialize)]
        struct Partial<'a> {
            method: &'a str,
            expression: &'a str,
            x0: f64,
        }
        let request = Partial {
            method: "newton_raphson",
            expression: "x^2 - 2",
            x0: 1.0,
        };
        let message = error_message(find_root(to_value(&request).expect("request")));
        assert!(message.contains("root finding failed"));
        assert!(message.contains("'derivative'"));
    }

    #[wasm_bindgen_test]
    fn linear_system_rejects_non_square_matrix() {
        #[derive(Serialize)]
        struct Linear {
            method: &'static str,
            #[serde(rename = "A")]
            a: Vec<Vec<f64>>,
            b: Vec<f64>,
        }
        let request = Linear {
            method: "doolittle",
            a: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            b: vec![1.0, 2.0],
        };
        let message = error_message(solve_linear_system(to_value(&request).expect("request")));
        assert!(message.contains("must be square"));
    }

    #[wasm_bindgen_test]
    fn interpolate_rejects_duplicate_samples() {
        #[derive(Serialize)]
        struct Samples {
            x: Vec<f64>,
            y: Vec<f64>,
        }
        let request = Samples {
            x: vec![1.0, 1.0],
            y: vec![2.0, 3.0],
        };
        let message = error_message(interpolate(to_value(&request).expect("request")));
        assert!(message.contains("duplicate sample"));
    }

    #[wasm_bindgen_test]
    fn expression_handle_evaluates_and_reports_domain_errors() {
        let expression = WasmExpression::new("sqrt(x) + 1").expect("expression");
        assert_eq!(expression.evaluate(4.0).expect("value"), 3.0);
        let message = expression
            .evaluate(-1.0)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("sqrt"));
        assert!(WasmExpression::new("sin(").is_err());
    }

    #[wasm_bindgen_test]
    fn expression_tabulation_checks_its_window() {
        let expression = WasmExpression::new("sqrt(x)").expect("expression");
        let points = expression.tabulate(-1.0, 1.0, 3).expect("table");
        let first = Reflect::get(&points, &JsValue::from_f64(0.0)).expect("first point");
        assert!(property(&first, "y").is_null());
        let last = Reflect::get(&points, &JsValue::from_f64(2.0)).expect("last point");
        assert_eq!(property(&last, "y").as_f64(), Some(1.0));

        let message = |result: Result<JsValue, JsValue>| {
            result
                .err()
                .and_then(|err| err.as_string())
                .unwrap_or_default()
        };
        assert!(message(expression.tabulate(f64::NAN, 1.0, 3)).contains("'start'"));
        assert!(message(expression.tabulate(1.0, 0.0, 3)).contains("'end'"));
        assert!(message(expression.tabulate(0.0, 1.0, u32::MAX)).contains("'samples'"));
    }
}
