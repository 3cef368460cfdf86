use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::script::ast::Stmt;
use crate::{Error, Result};

use super::{truthy, ExecFlow, FunctionValue, Interp, Value};

impl Interp<'_> {
    const EXEC_STMTS_STACK_RED_ZONE: usize = 64 * 1024;
    const EXEC_STMTS_STACK_SIZE: usize = 32 * 1024 * 1024;

    pub(crate) fn execute_stmts(&mut self, stmts: &[Stmt]) -> Result<ExecFlow> {
        stacker::maybe_grow(
            Self::EXEC_STMTS_STACK_RED_ZONE,
            Self::EXEC_STMTS_STACK_SIZE,
            || self.execute_stmts_impl(stmts),
        )
    }

    fn execute_stmts_impl(&mut self, stmts: &[Stmt]) -> Result<ExecFlow> {
        for stmt in stmts {
            match self.execute_stmt(stmt)? {
                ExecFlow::Continue => {}
                flow => return Ok(flow),
            }
        }
        Ok(ExecFlow::Continue)
    }

    // Function declarations are visible before their statement runs.
    pub(crate) fn hoist_function_decls(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::FunctionDecl { name, params, body } = stmt {
                let function = Value::Function(Rc::new(FunctionValue {
                    params: params.clone(),
                    body: body.clone(),
                    captured: self.scopes.clone(),
                }));
                self.declare(name, function);
            }
        }
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<ExecFlow> {
        self.steps += 1;
        if self.steps > self.page.script_step_limit {
            return Err(Error::ScriptRuntime(format!(
                "script step limit of {} exceeded",
                self.page.script_step_limit
            )));
        }

        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(ExecFlow::Continue)
            }
            Stmt::VarDecl { names } => {
                for (name, init) in names {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Undefined,
                    };
                    self.declare(name, value);
                }
                Ok(ExecFlow::Continue)
            }
            Stmt::FunctionDecl { name, params, body } => {
                let function = Value::Function(Rc::new(FunctionValue {
                    params: params.clone(),
                    body: body.clone(),
                    captured: self.scopes.clone(),
                }));
                self.declare(name, function);
                Ok(ExecFlow::Continue)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let test = self.eval(cond)?;
                if truthy(&test) {
                    self.execute_stmts(then)
                } else if let Some(otherwise) = otherwise {
                    self.execute_stmts(otherwise)
                } else {
                    Ok(ExecFlow::Continue)
                }
            }
            Stmt::While { cond, body } => {
                loop {
                    let test = self.eval(cond)?;
                    if !truthy(&test) {
                        break;
                    }
                    match self.execute_stmts(body)? {
                        ExecFlow::Continue => {}
                        ExecFlow::Break => break,
                        ExecFlow::ContinueLoop => continue,
                        ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                    }
                }
                Ok(ExecFlow::Continue)
            }
            Stmt::DoWhile { body, cond } => {
                loop {
                    match self.execute_stmts(body)? {
                        ExecFlow::Continue => {}
                        ExecFlow::Break => break,
                        ExecFlow::ContinueLoop => {}
                        ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                    }
                    let test = self.eval(cond)?;
                    if !truthy(&test) {
                        break;
                    }
                }
                Ok(ExecFlow::Continue)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.execute_stmt(init)?;
                }
                loop {
                    if let Some(cond) = cond {
                        let test = self.eval(cond)?;
                        if !truthy(&test) {
                            break;
                        }
                    }
                    match self.execute_stmts(body)? {
                        ExecFlow::Continue | ExecFlow::ContinueLoop => {}
                        ExecFlow::Break => break,
                        ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                    }
                    if let Some(update) = update {
                        self.eval(update)?;
                    }
                }
                Ok(ExecFlow::Continue)
            }
            Stmt::ForIn {
                var_name,
                object,
                body,
            } => {
                let object = self.eval(object)?;
                for key in self.enumerable_keys(&object) {
                    self.declare(var_name, Value::Str(key));
                    match self.execute_stmts(body)? {
                        ExecFlow::Continue | ExecFlow::ContinueLoop => {}
                        ExecFlow::Break => break,
                        ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                    }
                }
                Ok(ExecFlow::Continue)
            }
            Stmt::ForOf {
                var_name,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable)?;
                for item in self.iterable_items(&iterable)? {
                    self.declare(var_name, item);
                    match self.execute_stmts(body)? {
                        ExecFlow::Continue | ExecFlow::ContinueLoop => {}
                        ExecFlow::Break => break,
                        ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                    }
                }
                Ok(ExecFlow::Continue)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(ExecFlow::Return(value))
            }
            Stmt::Break => Ok(ExecFlow::Break),
            Stmt::Continue => Ok(ExecFlow::ContinueLoop),
            Stmt::Throw(expr) => {
                let value = self.eval(expr)?;
                let message = super::to_string_value(self.page, &value);
                self.thrown = Some(value);
                Err(Error::ScriptThrow(message))
            }
            Stmt::Try {
                body,
                catch,
                finally,
            } => self.execute_try(body, catch, finally),
            Stmt::Block(stmts) => self.execute_stmts(stmts),
        }
    }

    fn execute_try(
        &mut self,
        body: &[Stmt],
        catch: &Option<(Option<String>, Vec<Stmt>)>,
        finally: &Option<Vec<Stmt>>,
    ) -> Result<ExecFlow> {
        let mut result = self.execute_stmts(body);
        if let Err(error) = &result {
            if error.is_catchable() {
                if let Some((binding, catch_body)) = catch {
                    let caught = self
                        .thrown
                        .take()
                        .unwrap_or_else(|| super::error_to_value(error));
                    if let Some(name) = binding {
                        self.declare(name, caught);
                    }
                    result = self.execute_stmts(catch_body);
                }
            }
        }
        if let Some(finally_body) = finally {
            match self.execute_stmts(finally_body)? {
                ExecFlow::Continue => {}
                flow => return Ok(flow),
            }
        }
        result
    }

    fn enumerable_keys(&self, value: &Value) -> Vec<String> {
        match value {
            Value::Object(object) => object.borrow().keys(),
            Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
            Value::NodeList { nodes, .. } => (0..nodes.len()).map(|i| i.to_string()).collect(),
            Value::Str(s) => (0..s.encode_utf16().count()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    fn iterable_items(&self, value: &Value) -> Result<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::NodeList { doc, nodes } => Ok(nodes
                .iter()
                .map(|&node| Value::XmlNode { doc: *doc, node })
                .collect()),
            Value::Str(s) => Ok(s.chars().map(|ch| Value::Str(ch.to_string())).collect()),
            Value::Bytes(bytes) => Ok(bytes
                .borrow()
                .iter()
                .map(|&b| Value::Number(f64::from(b)))
                .collect()),
            other => Err(Error::ScriptRuntime(format!(
                "TypeError: {} is not iterable",
                super::type_of(other)
            ))),
        }
    }

    pub(crate) fn call_function(
        &mut self,
        function: &Rc<FunctionValue>,
        args: Vec<Value>,
    ) -> Result<Value> {
        const MAX_CALL_DEPTH: usize = 512;
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(Error::ScriptRuntime("too much recursion".to_string()));
        }
        self.call_depth += 1;

        let mut frame = HashMap::new();
        for (i, param) in function.params.iter().enumerate() {
            frame.insert(
                param.clone(),
                args.get(i).cloned().unwrap_or(Value::Undefined),
            );
        }

        let mut scopes = function.captured.clone();
        scopes.push(Rc::new(RefCell::new(frame)));
        let saved = std::mem::replace(&mut self.scopes, scopes);
        self.hoist_function_decls(&function.body);
        let result = self.execute_stmts(&function.body);
        self.scopes = saved;
        self.call_depth -= 1;

        match result? {
            ExecFlow::Return(value) => Ok(value),
            ExecFlow::Continue => Ok(Value::Undefined),
            ExecFlow::Break | ExecFlow::ContinueLoop => Err(Error::ScriptRuntime(
                "break or continue outside of a loop".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::html::parse_page;
    use crate::http::MockWebConnection;
    use crate::runtime::{drain_tasks, run_script, Page};

    fn alerts_for(source: &str) -> Vec<String> {
        let parsed = parse_page("<html><body></body></html>").unwrap();
        let mut page = Page::new("http://first/", parsed.dom, MockWebConnection::new());
        run_script(&mut page, source).unwrap();
        drain_tasks(&mut page).unwrap();
        page.alerts
    }

    #[test]
    fn loops_and_branches() {
        let alerts = alerts_for(
            "var total = 0;\
             for (var i = 0; i < 5; i++) { if (i == 2) { continue; } total += i; }\
             while (total > 8) { total--; }\
             do { total++; } while (false);\
             alert(total);",
        );
        assert_eq!(alerts, vec!["9"]);
    }

    #[test]
    fn functions_close_over_locals() {
        let alerts = alerts_for(
            "function makeCounter() {\
               var count = 0;\
               return function() { count++; return count; };\
             }\
             var next = makeCounter();\
             next();\
             alert(next());",
        );
        assert_eq!(alerts, vec!["2"]);
    }

    #[test]
    fn function_declarations_hoist() {
        let alerts = alerts_for("alert(twice(4)); function twice(n) { return n * 2; }");
        assert_eq!(alerts, vec!["8"]);
    }

    #[test]
    fn throw_and_catch_carry_values() {
        let alerts = alerts_for(
            "try { throw new TypeError('nope'); } catch (e) { alert(e.name); alert(e.message); }\
             try { throw 'plain'; } catch (e) { alert(e); }\
             var ran = false;\
             try { var x = 1; } finally { ran = true; }\
             alert(ran);",
        );
        assert_eq!(alerts, vec!["TypeError", "nope", "plain", "true"]);
    }

    #[test]
    fn runtime_errors_are_catchable() {
        let alerts = alerts_for(
            "try { missingFunction(); } catch (e) { alert('caught'); }\
             try { var v = null; v.anything; } catch (e) { alert(e.name); }",
        );
        assert_eq!(alerts, vec!["caught", "TypeError"]);
    }

    #[test]
    fn for_in_walks_object_keys() {
        let alerts = alerts_for(
            "var seen = [];\
             var o = { a: 1, b: 2 };\
             for (var key in o) { seen.push(key); }\
             for (var item of [10, 20]) { seen.push(item); }\
             alert(seen.join('-'));",
        );
        assert_eq!(alerts, vec!["a-b-10-20"]);
    }

    #[test]
    fn deep_recursion_is_reported() {
        let parsed = parse_page("<html><body></body></html>").unwrap();
        let mut page = Page::new("http://first/", parsed.dom, MockWebConnection::new());
        let err = run_script(&mut page, "function f() { return f(); } f();").unwrap_err();
        assert!(err.to_string().contains("too much recursion"));
    }
}
