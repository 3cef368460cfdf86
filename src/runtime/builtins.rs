use std::cell::RefCell;
use std::rc::Rc;

use unicode_normalization::UnicodeNormalization;

use crate::script::regex::{JsRegex, RegexError};
use crate::script::{format_float, parse_float_prefix, parse_int_prefix};
use crate::{Error, Result};

use super::{strict_eq, to_number, to_string_value, truthy, Interp, Value};

impl Interp<'_> {
    pub(crate) fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "alert" => {
                let message = args
                    .first()
                    .map(|value| to_string_value(self.page, value))
                    .unwrap_or_default();
                self.page.push_alert(message);
                Ok(Value::Undefined)
            }
            "parseInt" => {
                let text = self.arg_string(&args, 0);
                let radix = match args.get(1) {
                    None | Some(Value::Undefined) => None,
                    Some(value) => {
                        let n = to_number(self.page, value);
                        if n.is_finite() && n != 0.0 {
                            Some(n.trunc() as i64)
                        } else {
                            None
                        }
                    }
                };
                Ok(Value::Number(parse_int_prefix(&text, radix)))
            }
            "parseFloat" => {
                let text = self.arg_string(&args, 0);
                Ok(Value::Number(parse_float_prefix(&text)))
            }
            "isNaN" => {
                let n = to_number(self.page, args.first().unwrap_or(&Value::Undefined));
                Ok(Value::Bool(n.is_nan()))
            }
            "isFinite" => {
                let n = to_number(self.page, args.first().unwrap_or(&Value::Undefined));
                Ok(Value::Bool(n.is_finite()))
            }
            "Number" => Ok(Value::Number(match args.first() {
                Some(value) => to_number(self.page, value),
                None => 0.0,
            })),
            "String" => Ok(Value::Str(self.arg_string(&args, 0))),
            "Boolean" => Ok(Value::Bool(
                args.first().map(truthy).unwrap_or(false),
            )),
            _ => Err(Error::ScriptRuntime(format!(
                "ReferenceError: {name} is not defined"
            ))),
        }
    }

    pub(crate) fn string_method(&mut self, s: &str, name: &str, args: &[Value]) -> Result<Value> {
        // Index arguments count UTF-16 units, the way scripts see strings.
        let units: Vec<u16> = s.encode_utf16().collect();
        let len = units.len() as i64;
        match name {
            "charAt" => {
                let i = self.int_arg(args, 0);
                Ok(Value::Str(match unit_at(&units, i) {
                    Some(unit) => String::from_utf16_lossy(&[unit]),
                    None => String::new(),
                }))
            }
            "charCodeAt" => {
                let i = self.int_arg(args, 0);
                Ok(Value::Number(match unit_at(&units, i) {
                    Some(unit) => f64::from(unit),
                    None => f64::NAN,
                }))
            }
            "codePointAt" => {
                let i = self.int_arg(args, 0);
                if i < 0 || i >= len {
                    return Ok(Value::Undefined);
                }
                let point = match char::decode_utf16(units[i as usize..].iter().copied()).next() {
                    Some(Ok(c)) => u32::from(c),
                    Some(Err(err)) => u32::from(err.unpaired_surrogate()),
                    None => return Ok(Value::Undefined),
                };
                Ok(Value::Number(f64::from(point)))
            }
            "indexOf" => {
                let needle = utf16(&self.arg_string(args, 0));
                let from = self.int_arg(args, 1).clamp(0, len) as usize;
                Ok(Value::Number(match find_units(&units, &needle, from) {
                    Some(i) => i as f64,
                    None => -1.0,
                }))
            }
            "lastIndexOf" => {
                let needle = utf16(&self.arg_string(args, 0));
                Ok(Value::Number(match rfind_units(&units, &needle) {
                    Some(i) => i as f64,
                    None => -1.0,
                }))
            }
            "includes" => {
                let needle = utf16(&self.arg_string(args, 0));
                Ok(Value::Bool(find_units(&units, &needle, 0).is_some()))
            }
            "startsWith" => {
                let needle = utf16(&self.arg_string(args, 0));
                Ok(Value::Bool(units.starts_with(&needle)))
            }
            "endsWith" => {
                let needle = utf16(&self.arg_string(args, 0));
                Ok(Value::Bool(units.ends_with(&needle)))
            }
            "substring" => {
                let mut start = self.int_arg(args, 0).clamp(0, len);
                let mut end = self.opt_int_arg(args, 1).unwrap_or(len).clamp(0, len);
                if start > end {
                    std::mem::swap(&mut start, &mut end);
                }
                Ok(Value::Str(String::from_utf16_lossy(
                    &units[start as usize..end as usize],
                )))
            }
            "slice" => {
                let start = resolve_slice_index(self.int_arg(args, 0), len);
                let end = resolve_slice_index(self.opt_int_arg(args, 1).unwrap_or(len), len);
                if start >= end {
                    return Ok(Value::Str(String::new()));
                }
                Ok(Value::Str(String::from_utf16_lossy(&units[start..end])))
            }
            "substr" => {
                let start = if self.int_arg(args, 0) < 0 {
                    (len + self.int_arg(args, 0)).max(0)
                } else {
                    self.int_arg(args, 0).min(len)
                };
                let count = self
                    .opt_int_arg(args, 1)
                    .unwrap_or(len - start)
                    .clamp(0, len - start);
                let start = start as usize;
                Ok(Value::Str(String::from_utf16_lossy(
                    &units[start..start + count as usize],
                )))
            }
            "split" => self.string_split(s, &units, args),
            "replace" => self.string_replace(s, args),
            "match" => self.string_match(s, args),
            "search" => {
                let regex = self.regex_arg(args, 0)?;
                match regex.find(s).map_err(regex_error)? {
                    Some(found) => Ok(Value::Number(
                        s[..found.start()].encode_utf16().count() as f64,
                    )),
                    None => Ok(Value::Number(-1.0)),
                }
            }
            "toUpperCase" => Ok(Value::Str(s.to_uppercase())),
            "toLowerCase" => Ok(Value::Str(s.to_lowercase())),
            "trim" => Ok(Value::Str(s.trim().to_string())),
            "concat" => {
                let mut out = s.to_string();
                for arg in args {
                    out.push_str(&to_string_value(self.page, arg));
                }
                Ok(Value::Str(out))
            }
            "repeat" => {
                let count = to_number(self.page, args.first().unwrap_or(&Value::Undefined));
                if count < 0.0 || count.is_infinite() {
                    return Err(Error::ScriptRuntime(
                        "RangeError: invalid repeat count".to_string(),
                    ));
                }
                let count = if count.is_nan() { 0 } else { count.trunc() as usize };
                Ok(Value::Str(s.repeat(count)))
            }
            "normalize" => {
                let form = match args.first() {
                    None | Some(Value::Undefined) => "NFC".to_string(),
                    Some(value) => to_string_value(self.page, value),
                };
                let normalized = match form.as_str() {
                    "NFC" => s.nfc().collect::<String>(),
                    "NFD" => s.nfd().collect::<String>(),
                    "NFKC" => s.nfkc().collect::<String>(),
                    "NFKD" => s.nfkd().collect::<String>(),
                    other => {
                        return Err(Error::ScriptRuntime(format!(
                            "RangeError: invalid normalization form {other}"
                        )));
                    }
                };
                Ok(Value::Str(normalized))
            }
            "localeCompare" => {
                let other = self.arg_string(args, 0);
                Ok(Value::Number(match s.cmp(other.as_str()) {
                    std::cmp::Ordering::Less => -1.0,
                    std::cmp::Ordering::Equal => 0.0,
                    std::cmp::Ordering::Greater => 1.0,
                }))
            }
            "toString" | "valueOf" => Ok(Value::Str(s.to_string())),
            _ => Err(Error::ScriptRuntime(format!(
                "TypeError: {name} is not a function"
            ))),
        }
    }

    fn string_split(&mut self, s: &str, units: &[u16], args: &[Value]) -> Result<Value> {
        let limit = match args.get(1) {
            None | Some(Value::Undefined) => usize::MAX,
            Some(value) => {
                let n = to_number(self.page, value);
                if n.is_nan() || n < 0.0 {
                    0
                } else {
                    n.trunc() as usize
                }
            }
        };
        let mut parts: Vec<Value> = match args.first() {
            None | Some(Value::Undefined) => vec![Value::Str(s.to_string())],
            Some(Value::Regex(regex)) => regex
                .split_all(s)
                .map_err(regex_error)?
                .into_iter()
                .map(Value::Str)
                .collect(),
            Some(separator) => {
                let separator = to_string_value(self.page, separator);
                if separator.is_empty() {
                    units
                        .iter()
                        .map(|&unit| Value::Str(String::from_utf16_lossy(&[unit])))
                        .collect()
                } else {
                    s.split(separator.as_str())
                        .map(|part| Value::Str(part.to_string()))
                        .collect()
                }
            }
        };
        parts.truncate(limit);
        Ok(Value::Array(Rc::new(RefCell::new(parts))))
    }

    fn string_replace(&mut self, s: &str, args: &[Value]) -> Result<Value> {
        if let Some(Value::Function(_)) = args.get(1) {
            return Err(Error::ScriptRuntime(
                "TypeError: function replacement values are not supported".to_string(),
            ));
        }
        let replacement = self.arg_string(args, 1);
        match args.first() {
            Some(Value::Regex(regex)) => Ok(Value::Str(
                regex.replace(s, &replacement).map_err(regex_error)?,
            )),
            _ => {
                let pattern = self.arg_string(args, 0);
                Ok(Value::Str(s.replacen(pattern.as_str(), &replacement, 1)))
            }
        }
    }

    fn string_match(&mut self, s: &str, args: &[Value]) -> Result<Value> {
        let regex = self.regex_arg(args, 0)?;
        if regex.is_global() {
            let found = regex.find_all(s).map_err(regex_error)?;
            if found.is_empty() {
                return Ok(Value::Null);
            }
            let items: Vec<Value> = found
                .into_iter()
                .map(|m| Value::Str(m.as_str().to_string()))
                .collect();
            return Ok(Value::Array(Rc::new(RefCell::new(items))));
        }
        match regex.captures(s).map_err(regex_error)? {
            Some(captures) => Ok(Value::Array(Rc::new(RefCell::new(capture_values(
                &captures,
            ))))),
            None => Ok(Value::Null),
        }
    }

    fn regex_arg(&mut self, args: &[Value], index: usize) -> Result<Rc<JsRegex>> {
        match args.get(index) {
            Some(Value::Regex(regex)) => Ok(regex.clone()),
            other => {
                let pattern = other
                    .map(|value| to_string_value(self.page, value))
                    .unwrap_or_default();
                JsRegex::compile(&pattern, "")
                    .map(Rc::new)
                    .map_err(|err| Error::ScriptRuntime(format!("SyntaxError: {err}")))
            }
        }
    }

    pub(crate) fn array_method(
        &mut self,
        items: &Rc<RefCell<Vec<Value>>>,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        match name {
            "push" => {
                let mut borrowed = items.borrow_mut();
                borrowed.extend(args.iter().cloned());
                Ok(Value::Number(borrowed.len() as f64))
            }
            "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
            "shift" => {
                let mut borrowed = items.borrow_mut();
                if borrowed.is_empty() {
                    Ok(Value::Undefined)
                } else {
                    Ok(borrowed.remove(0))
                }
            }
            "unshift" => {
                let mut borrowed = items.borrow_mut();
                for (i, arg) in args.iter().enumerate() {
                    borrowed.insert(i, arg.clone());
                }
                Ok(Value::Number(borrowed.len() as f64))
            }
            "join" => {
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(value) => to_string_value(self.page, value),
                };
                let snapshot = items.borrow().clone();
                let parts: Vec<String> = snapshot
                    .iter()
                    .map(|item| match item {
                        Value::Undefined | Value::Null => String::new(),
                        other => to_string_value(self.page, other),
                    })
                    .collect();
                Ok(Value::Str(parts.join(&separator)))
            }
            "indexOf" => {
                let wanted = args.first().cloned().unwrap_or(Value::Undefined);
                let found = items
                    .borrow()
                    .iter()
                    .position(|item| strict_eq(item, &wanted));
                Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
            }
            "lastIndexOf" => {
                let wanted = args.first().cloned().unwrap_or(Value::Undefined);
                let found = items
                    .borrow()
                    .iter()
                    .rposition(|item| strict_eq(item, &wanted));
                Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
            }
            "includes" => {
                let wanted = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::Bool(
                    items.borrow().iter().any(|item| strict_eq(item, &wanted)),
                ))
            }
            "slice" => {
                let len = items.borrow().len() as i64;
                let start = resolve_slice_index(self.int_arg(args, 0), len);
                let end = resolve_slice_index(self.opt_int_arg(args, 1).unwrap_or(len), len);
                let sliced = if start >= end {
                    Vec::new()
                } else {
                    items.borrow()[start..end].to_vec()
                };
                Ok(Value::Array(Rc::new(RefCell::new(sliced))))
            }
            "splice" => {
                let len = items.borrow().len() as i64;
                let start = resolve_slice_index(self.int_arg(args, 0), len);
                let delete = match args.get(1) {
                    None | Some(Value::Undefined) => len as usize - start,
                    _ => self.int_arg(args, 1).clamp(0, len - start as i64) as usize,
                };
                let inserted: Vec<Value> = args.iter().skip(2).cloned().collect();
                let removed: Vec<Value> = items
                    .borrow_mut()
                    .splice(start..start + delete, inserted)
                    .collect();
                Ok(Value::Array(Rc::new(RefCell::new(removed))))
            }
            "concat" => {
                let mut out = items.borrow().clone();
                for arg in args {
                    match arg {
                        Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                        other => out.push(other.clone()),
                    }
                }
                Ok(Value::Array(Rc::new(RefCell::new(out))))
            }
            "reverse" => {
                items.borrow_mut().reverse();
                Ok(Value::Array(items.clone()))
            }
            "sort" => self.array_sort(items, args),
            "forEach" => {
                let function = self.function_arg(args, 0, "forEach")?;
                let snapshot = items.borrow().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.call_function(&function, vec![item, Value::Number(i as f64)])?;
                }
                Ok(Value::Undefined)
            }
            "map" => {
                let function = self.function_arg(args, 0, "map")?;
                let snapshot = items.borrow().clone();
                let mut mapped = Vec::with_capacity(snapshot.len());
                for (i, item) in snapshot.into_iter().enumerate() {
                    mapped.push(self.call_function(&function, vec![item, Value::Number(i as f64)])?);
                }
                Ok(Value::Array(Rc::new(RefCell::new(mapped))))
            }
            "filter" => {
                let function = self.function_arg(args, 0, "filter")?;
                let snapshot = items.borrow().clone();
                let mut kept = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let keep = self
                        .call_function(&function, vec![item.clone(), Value::Number(i as f64)])?;
                    if truthy(&keep) {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(Rc::new(RefCell::new(kept))))
            }
            "toString" => self.array_method(items, "join", &[]),
            _ => Err(Error::ScriptRuntime(format!(
                "TypeError: {name} is not a function"
            ))),
        }
    }

    fn array_sort(&mut self, items: &Rc<RefCell<Vec<Value>>>, args: &[Value]) -> Result<Value> {
        let comparator = match args.first() {
            Some(Value::Function(function)) => Some(function.clone()),
            _ => None,
        };
        let mut sorted = items.borrow().clone();
        // Insertion sort keeps the comparator fallible without unwinding.
        let mut i = 1;
        while i < sorted.len() {
            let mut j = i;
            while j > 0 {
                let order = match &comparator {
                    Some(function) => {
                        let result = self.call_function(
                            &function.clone(),
                            vec![sorted[j - 1].clone(), sorted[j].clone()],
                        )?;
                        let n = to_number(self.page, &result);
                        if n.is_nan() {
                            0.0
                        } else {
                            n
                        }
                    }
                    None => {
                        let a = to_string_value(self.page, &sorted[j - 1]);
                        let b = to_string_value(self.page, &sorted[j]);
                        match a.cmp(&b) {
                            std::cmp::Ordering::Greater => 1.0,
                            _ => 0.0,
                        }
                    }
                };
                if order > 0.0 {
                    sorted.swap(j - 1, j);
                    j -= 1;
                } else {
                    break;
                }
            }
            i += 1;
        }
        *items.borrow_mut() = sorted;
        Ok(Value::Array(items.clone()))
    }

    fn function_arg(
        &self,
        args: &[Value],
        index: usize,
        label: &str,
    ) -> Result<Rc<super::FunctionValue>> {
        match args.get(index) {
            Some(Value::Function(function)) => Ok(function.clone()),
            _ => Err(Error::ScriptRuntime(format!(
                "TypeError: {label} expects a function"
            ))),
        }
    }

    pub(crate) fn number_method(&mut self, n: f64, name: &str, args: &[Value]) -> Result<Value> {
        match name {
            "toString" => match args.first() {
                None | Some(Value::Undefined) => Ok(Value::Str(format_float(n))),
                Some(value) => {
                    let radix = to_number(self.page, value);
                    if !radix.is_finite() || !(2.0..=36.0).contains(&radix.trunc()) {
                        return Err(Error::ScriptRuntime(
                            "RangeError: toString() radix must be between 2 and 36".to_string(),
                        ));
                    }
                    let radix = radix.trunc() as u32;
                    if radix == 10 {
                        return Ok(Value::Str(format_float(n)));
                    }
                    Ok(Value::Str(format_radix(n, radix)))
                }
            },
            "toFixed" => {
                let digits = to_number(self.page, args.first().unwrap_or(&Value::Undefined));
                let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
                if !(0.0..=100.0).contains(&digits) {
                    return Err(Error::ScriptRuntime(
                        "RangeError: toFixed() digits must be between 0 and 100".to_string(),
                    ));
                }
                if n.is_nan() {
                    return Ok(Value::Str("NaN".to_string()));
                }
                if n.is_infinite() {
                    return Ok(Value::Str(format_float(n)));
                }
                Ok(Value::Str(format!("{:.*}", digits as usize, n)))
            }
            "valueOf" => Ok(Value::Number(n)),
            _ => Err(Error::ScriptRuntime(format!(
                "TypeError: {name} is not a function"
            ))),
        }
    }

    pub(crate) fn math_method(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let first = to_number(self.page, args.first().unwrap_or(&Value::Undefined));
        let result = match name {
            "floor" => first.floor(),
            "ceil" => first.ceil(),
            "round" => (first + 0.5).floor(),
            "abs" => first.abs(),
            "sqrt" => first.sqrt(),
            "trunc" => first.trunc(),
            "pow" => {
                let exponent = to_number(self.page, args.get(1).unwrap_or(&Value::Undefined));
                first.powf(exponent)
            }
            "max" => {
                let mut best = f64::NEG_INFINITY;
                for arg in args {
                    let n = to_number(self.page, arg);
                    if n.is_nan() {
                        return Ok(Value::Number(f64::NAN));
                    }
                    best = best.max(n);
                }
                best
            }
            "min" => {
                let mut best = f64::INFINITY;
                for arg in args {
                    let n = to_number(self.page, arg);
                    if n.is_nan() {
                        return Ok(Value::Number(f64::NAN));
                    }
                    best = best.min(n);
                }
                best
            }
            _ => {
                return Err(Error::ScriptRuntime(format!(
                    "TypeError: {name} is not a function"
                )));
            }
        };
        Ok(Value::Number(result))
    }

    pub(crate) fn regex_method(
        &mut self,
        regex: &Rc<JsRegex>,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        match name {
            "test" => {
                let input = self.arg_string(args, 0);
                Ok(Value::Bool(regex.is_match(&input).map_err(regex_error)?))
            }
            "exec" => {
                let input = self.arg_string(args, 0);
                match regex.captures(&input).map_err(regex_error)? {
                    Some(captures) => Ok(Value::Array(Rc::new(RefCell::new(capture_values(
                        &captures,
                    ))))),
                    None => Ok(Value::Null),
                }
            }
            "toString" => Ok(Value::Str(format!("/{}/{}", regex.source(), regex.flags()))),
            _ => Err(Error::ScriptRuntime(format!(
                "TypeError: {name} is not a function"
            ))),
        }
    }

    pub(crate) fn int_arg(&self, args: &[Value], index: usize) -> i64 {
        let n = to_number(self.page, args.get(index).unwrap_or(&Value::Undefined));
        if n.is_nan() {
            0
        } else {
            n.trunc() as i64
        }
    }

    fn opt_int_arg(&self, args: &[Value], index: usize) -> Option<i64> {
        match args.get(index) {
            None | Some(Value::Undefined) => None,
            Some(_) => Some(self.int_arg(args, index)),
        }
    }
}

fn capture_values(captures: &crate::script::regex::Captures) -> Vec<Value> {
    (0..captures.len())
        .map(|i| match captures.get(i) {
            Some(m) => Value::Str(m.as_str().to_string()),
            None => Value::Undefined,
        })
        .collect()
}

fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn unit_at(units: &[u16], index: i64) -> Option<u16> {
    if index < 0 {
        return None;
    }
    units.get(index as usize).copied()
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if from + needle.len() > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

fn rfind_units(haystack: &[u16], needle: &[u16]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

fn resolve_slice_index(index: i64, len: i64) -> usize {
    if index < 0 {
        (len + index).max(0) as usize
    } else {
        index.min(len) as usize
    }
}

fn format_radix(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return format_float(n);
    }
    // Fractional parts are dropped for non-decimal radixes.
    let value = n.trunc() as i64;
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    let mut magnitude = value.unsigned_abs();
    while magnitude > 0 {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        magnitude /= u64::from(radix);
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn regex_error(err: RegexError) -> Error {
    Error::ScriptRuntime(format!("InternalError: {err}"))
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
    fn string_methods_index_by_utf16_unit() {
        let alerts = alerts_for(
            "var s = '\\u0645\\u0631\\u062d\\u0628\\u0627';\
             alert(s.length);\
             alert(s.charCodeAt(0));\
             alert(s.charAt(1) == '\\u0631');\
             alert(s.indexOf('\\u062d'));\
             alert(s.substring(1, 3).length);",
        );
        assert_eq!(alerts, vec!["5", "1605", "true", "2", "2"]);
    }

    #[test]
    fn string_slicing_and_search() {
        let alerts = alerts_for(
            "var s = 'hello world';\
             alert(s.slice(-5));\
             alert(s.substring(6, 2));\
             alert(s.substr(6));\
             alert(s.toUpperCase());\
             alert(s.split(' ').join('|'));\
             alert(s.replace('world', 'there'));\
             alert(s.indexOf('o', 5));",
        );
        assert_eq!(
            alerts,
            vec![
                "world",
                "llo ",
                "world",
                "HELLO WORLD",
                "hello|world",
                "hello there",
                "7"
            ]
        );
    }

    #[test]
    fn regex_flavoured_string_methods() {
        let alerts = alerts_for(
            "var s = 'a1b22c333';\
             alert(s.replace(/\\d+/g, '#'));\
             alert(s.match(/\\d+/g).join(','));\
             alert(s.search(/22/));\
             alert(/^a\\d/.test(s));\
             var m = /([a-z])(\\d+)/.exec(s);\
             alert(m[0] + ' ' + m[1] + ' ' + m[2]);",
        );
        assert_eq!(
            alerts,
            vec!["a#b#c#", "1,22,333", "3", "true", "a1 a 1"]
        );
    }

    #[test]
    fn array_methods_mutate_and_derive() {
        let alerts = alerts_for(
            "var a = [3, 1, 2];\
             alert(a.push(4));\
             alert(a.join('-'));\
             alert(a.sort().join(','));\
             alert(a.sort(function(x, y) { return y - x; }).join(','));\
             alert(a.slice(1, 3).join(','));\
             alert(a.indexOf(2));\
             alert(a.map(function(x) { return x * 10; }).join(','));\
             alert(a.filter(function(x) { return x > 2; }).join(','));\
             var removed = a.splice(1, 2, 9);\
             alert(removed.join(',') + '/' + a.join(','));",
        );
        assert_eq!(
            alerts,
            vec![
                "4",
                "3-1-2-4",
                "1,2,3,4",
                "4,3,2,1",
                "3,2",
                "2",
                "40,30,20,10",
                "4,3",
                "3,2/4,9,1"
            ]
        );
    }

    #[test]
    fn number_formatting() {
        let alerts = alerts_for(
            "alert((255).toString(16));\
             alert((8).toString(2));\
             alert((3.14159).toFixed(2));\
             alert((1.5).toString());\
             alert(parseInt('2f', 16));\
             alert(parseInt('  42px'));\
             alert(parseFloat('3.5e1x'));\
             alert(isNaN(parseInt('px')));",
        );
        assert_eq!(
            alerts,
            vec!["ff", "1000", "3.14", "1.5", "47", "42", "35", "true"]
        );
    }

    #[test]
    fn math_and_char_codes() {
        let alerts = alerts_for(
            "alert(Math.floor(2.7));\
             alert(Math.round(2.5));\
             alert(Math.round(-2.5));\
             alert(Math.max(1, 9, 4));\
             alert(Math.min());\
             alert(Math.pow(2, 10));\
             alert(String.fromCharCode(1605, 1585));",
        );
        assert_eq!(
            alerts,
            vec!["2", "3", "-2", "9", "Infinity", "1024", "\u{645}\u{631}"]
        );
    }

    #[test]
    fn normalize_follows_unicode_forms() {
        let alerts = alerts_for(
            "var composed = '\\u00e9';\
             var decomposed = 'e\\u0301';\
             alert(composed == decomposed);\
             alert(composed == decomposed.normalize());\
             alert(composed.normalize('NFD') == decomposed);\
             alert(composed.normalize('NFD').length);",
        );
        assert_eq!(alerts, vec!["false", "true", "true", "2"]);
    }
}
