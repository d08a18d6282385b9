//! 从模型回复中恢复 JSON

use serde::de::DeserializeOwned;

/// 提取第一个括号配平的 `{...}` 片段；字符串字面量内的括号不计数
pub fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in content[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 先整体解析；失败则提取首个 JSON 对象再解析
pub fn parse_lenient<T: DeserializeOwned>(content: &str) -> Result<T, String> {
    let trimmed = content.trim();
    match serde_json::from_str(trimmed) {
        Ok(v) => Ok(v),
        Err(strict) => {
            let fragment = extract_json_object(trimmed)
                .ok_or_else(|| format!("no JSON object in reply ({})", strict))?;
            serde_json::from_str(fragment).map_err(|e| e.to_string())
        }
    }
}
