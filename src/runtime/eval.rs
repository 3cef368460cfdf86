use std::cell::RefCell;
use std::rc::Rc;

use crate::script::ast::{AssignOp, AssignTarget, BinaryOp, Expr, LogicalOp, UnaryOp, UpdateOp};
use crate::script::regex::JsRegex;
use crate::{Error, Result};

use super::{
    loose_eq, strict_eq, to_number, to_string_value, truthy, type_of, FunctionValue, Interp,
    ObjectValue, Value,
};

impl Interp<'_> {
    const EVAL_EXPR_STACK_RED_ZONE: usize = 64 * 1024;
    const EVAL_EXPR_STACK_SIZE: usize = 32 * 1024 * 1024;

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value> {
        stacker::maybe_grow(
            Self::EVAL_EXPR_STACK_RED_ZONE,
            Self::EVAL_EXPR_STACK_SIZE,
            || self.eval_impl(expr),
        )
    }

    fn eval_impl(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Regex { pattern, flags } => JsRegex::compile(pattern, flags)
                .map(|regex| Value::Regex(Rc::new(regex)))
                .map_err(|err| Error::ScriptRuntime(format!("SyntaxError: {err}"))),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(Rc::new(RefCell::new(values))))
            }
            Expr::Object(props) => {
                let mut object = ObjectValue::default();
                for (key, value) in props {
                    let value = self.eval(value)?;
                    object.set(key, value);
                }
                Ok(Value::Object(Rc::new(RefCell::new(object))))
            }
            Expr::Var(name) => self
                .lookup(name)
                .or_else(|| self.global_value(name))
                .ok_or_else(|| {
                    Error::ScriptRuntime(format!("ReferenceError: {name} is not defined"))
                }),
            Expr::Function { params, body } => Ok(Value::Function(Rc::new(FunctionValue {
                params: params.clone(),
                body: body.clone(),
                captured: self.scopes.clone(),
            }))),
            Expr::Member { target, name } => {
                let target = self.eval(target)?;
                self.member_get(&target, name)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index_get(&target, &index)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::New { ctor, args } => {
                let args = self.eval_args(args)?;
                self.construct(ctor, args)
            }
            Expr::Unary { op, operand } => self.eval_unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                self.binary_op(*op, lhs, rhs)
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                match op {
                    LogicalOp::And => {
                        if truthy(&lhs) {
                            self.eval(rhs)
                        } else {
                            Ok(lhs)
                        }
                    }
                    LogicalOp::Or => {
                        if truthy(&lhs) {
                            Ok(lhs)
                        } else {
                            self.eval(rhs)
                        }
                    }
                }
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond)?;
                if truthy(&cond) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign { target, op, value } => {
                let rhs = self.eval(value)?;
                let result = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::Add => {
                        let old = self.read_target(target)?;
                        self.binary_op(BinaryOp::Add, old, rhs)?
                    }
                    AssignOp::Sub => {
                        let old = self.read_target(target)?;
                        self.binary_op(BinaryOp::Sub, old, rhs)?
                    }
                    AssignOp::Mul => {
                        let old = self.read_target(target)?;
                        self.binary_op(BinaryOp::Mul, old, rhs)?
                    }
                    AssignOp::Div => {
                        let old = self.read_target(target)?;
                        self.binary_op(BinaryOp::Div, old, rhs)?
                    }
                };
                self.write_target(target, result.clone())?;
                Ok(result)
            }
            Expr::Update { target, op, prefix } => {
                let old = self.read_target(target)?;
                let old = to_number(self.page, &old);
                let new = match op {
                    UpdateOp::Incr => old + 1.0,
                    UpdateOp::Decr => old - 1.0,
                };
                self.write_target(target, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Value> {
        if op == UnaryOp::TypeOf {
            // typeof never throws on unresolved names.
            if let Expr::Var(name) = operand {
                let value = self.lookup(name).or_else(|| self.global_value(name));
                return Ok(Value::Str(match value {
                    Some(value) => type_of(&value).to_string(),
                    None => "undefined".to_string(),
                }));
            }
        }
        let value = self.eval(operand)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
            UnaryOp::Neg => Ok(Value::Number(-to_number(self.page, &value))),
            UnaryOp::Plus => Ok(Value::Number(to_number(self.page, &value))),
            UnaryOp::TypeOf => Ok(Value::Str(type_of(&value).to_string())),
        }
    }

    pub(crate) fn binary_op(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
        match op {
            BinaryOp::Add => {
                let lhs = self.to_primitive(lhs);
                let rhs = self.to_primitive(rhs);
                if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
                    let mut out = to_string_value(self.page, &lhs);
                    out.push_str(&to_string_value(self.page, &rhs));
                    Ok(Value::Str(out))
                } else {
                    Ok(Value::Number(
                        to_number(self.page, &lhs) + to_number(self.page, &rhs),
                    ))
                }
            }
            BinaryOp::Sub => Ok(Value::Number(
                to_number(self.page, &lhs) - to_number(self.page, &rhs),
            )),
            BinaryOp::Mul => Ok(Value::Number(
                to_number(self.page, &lhs) * to_number(self.page, &rhs),
            )),
            BinaryOp::Div => Ok(Value::Number(
                to_number(self.page, &lhs) / to_number(self.page, &rhs),
            )),
            BinaryOp::Mod => Ok(Value::Number(
                to_number(self.page, &lhs) % to_number(self.page, &rhs),
            )),
            BinaryOp::Eq => Ok(Value::Bool(loose_eq(self.page, &lhs, &rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!loose_eq(self.page, &lhs, &rhs))),
            BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(&lhs, &rhs))),
            BinaryOp::StrictNe => Ok(Value::Bool(!strict_eq(&lhs, &rhs))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let lhs = self.to_primitive(lhs);
                let rhs = self.to_primitive(rhs);
                let result = if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
                    match op {
                        BinaryOp::Lt => a < b,
                        BinaryOp::Le => a <= b,
                        BinaryOp::Gt => a > b,
                        _ => a >= b,
                    }
                } else {
                    let a = to_number(self.page, &lhs);
                    let b = to_number(self.page, &rhs);
                    match op {
                        BinaryOp::Lt => a < b,
                        BinaryOp::Le => a <= b,
                        BinaryOp::Gt => a > b,
                        _ => a >= b,
                    }
                };
                Ok(Value::Bool(result))
            }
        }
    }

    fn to_primitive(&self, value: Value) -> Value {
        match value {
            Value::Undefined
            | Value::Null
            | Value::Bool(_)
            | Value::Number(_)
            | Value::Str(_) => value,
            other => Value::Str(to_string_value(self.page, &other)),
        }
    }

    pub(crate) fn global_value(&self, name: &str) -> Option<Value> {
        match name {
            "document" => Some(Value::Document),
            "window" | "self" | "top" => Some(Value::Window),
            "location" => Some(Value::Location),
            "Math" => Some(Value::Math),
            "String" => Some(Value::StringConstructor),
            "NaN" => Some(Value::Number(f64::NAN)),
            "Infinity" => Some(Value::Number(f64::INFINITY)),
            _ => None,
        }
    }

    fn read_target(&mut self, target: &AssignTarget) -> Result<Value> {
        match target {
            AssignTarget::Var(name) => self
                .lookup(name)
                .or_else(|| self.global_value(name))
                .ok_or_else(|| {
                    Error::ScriptRuntime(format!("ReferenceError: {name} is not defined"))
                }),
            AssignTarget::Member { target, name } => {
                let target = self.eval(target)?;
                self.member_get(&target, name)
            }
            AssignTarget::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index_get(&target, &index)
            }
        }
    }

    fn write_target(&mut self, target: &AssignTarget, value: Value) -> Result<()> {
        match target {
            AssignTarget::Var(name) => {
                self.assign_var(name, value);
                Ok(())
            }
            AssignTarget::Member { target, name } => {
                let target = self.eval(target)?;
                self.member_set(&target, name, value)
            }
            AssignTarget::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index_set(&target, &index, value)
            }
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value> {
        match callee {
            Expr::Var(name) => {
                if let Some(value) = self.lookup(name) {
                    let args = self.eval_args(args)?;
                    return self.call_callable(&value, args, name);
                }
                let args = self.eval_args(args)?;
                self.call_global(name, args)
            }
            Expr::Member { target, name } => {
                let target = self.eval(target)?;
                let args = self.eval_args(args)?;
                self.method_call(target, name, args)
            }
            other => {
                let callee = self.eval(other)?;
                let args = self.eval_args(args)?;
                self.call_callable(&callee, args, "expression")
            }
        }
    }

    pub(crate) fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    pub(crate) fn call_callable(
        &mut self,
        value: &Value,
        args: Vec<Value>,
        label: &str,
    ) -> Result<Value> {
        match value {
            Value::Function(function) => {
                let function = function.clone();
                self.call_function(&function, args)
            }
            Value::StringConstructor => Ok(Value::Str(
                args.first()
                    .map(|value| to_string_value(self.page, value))
                    .unwrap_or_default(),
            )),
            _ => Err(Error::ScriptRuntime(format!(
                "TypeError: {label} is not a function"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::html::parse_page;
    use crate::http::MockWebConnection;
    use crate::runtime::{run_script, Page};

    fn alerts_for(source: &str) -> Vec<String> {
        let parsed = parse_page("<html><body></body></html>").unwrap();
        let mut page = Page::new("http://first/", parsed.dom, MockWebConnection::new());
        run_script(&mut page, source).unwrap();
        page.alerts
    }

    #[test]
    fn arithmetic_and_concatenation() {
        let alerts = alerts_for(
            "alert(1 + 2 * 3);\
             alert('a' + 1 + 2);\
             alert(10 % 3);\
             alert('5' - 2);\
             alert(1 / 0);",
        );
        assert_eq!(alerts, vec!["7", "a12", "1", "3", "Infinity"]);
    }

    #[test]
    fn equality_flavours() {
        let alerts = alerts_for(
            "alert(5 == '5');\
             alert(5 === '5');\
             alert(null == undefined);\
             alert(null === undefined);\
             alert(NaN == NaN);",
        );
        assert_eq!(alerts, vec!["true", "false", "true", "false", "false"]);
    }

    #[test]
    fn logic_short_circuits() {
        let alerts = alerts_for(
            "alert(false && missing());\
             alert(true || missing());\
             alert('' || 'fallback');\
             alert(1 && 'second');",
        );
        assert_eq!(alerts, vec!["false", "true", "fallback", "second"]);
    }

    #[test]
    fn typeof_does_not_throw() {
        let alerts = alerts_for(
            "alert(typeof 5);\
             alert(typeof 'x');\
             alert(typeof undefined);\
             alert(typeof neverDeclared);\
             alert(typeof {});\
             alert(typeof function() {});",
        );
        assert_eq!(
            alerts,
            vec!["number", "string", "undefined", "undefined", "object", "function"]
        );
    }

    #[test]
    fn objects_arrays_and_updates() {
        let alerts = alerts_for(
            "var o = { count: 1 };\
             o.count += 4;\
             o['count']++;\
             alert(o.count);\
             var a = [1, 2, 3];\
             a[0] = 9;\
             alert(a.length);\
             alert(a[0]);",
        );
        assert_eq!(alerts, vec!["6", "3", "9"]);
    }

    #[test]
    fn ternaries_and_unaries() {
        let alerts = alerts_for(
            "alert(3 > 2 ? 'yes' : 'no');\
             alert(-'4');\
             alert(+true);\
             alert(!0);",
        );
        assert_eq!(alerts, vec!["yes", "-4", "1", "true"]);
    }
}
