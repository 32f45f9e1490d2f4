//! Raw API requests through the client runtime

use reqwest::Method;

use crate::cache::QueryParams;
use crate::cli::args::GlobalOptions;
use crate::cli::resource::parse_object;
use crate::cli::{CommandContext, OutputFormat};
use crate::error::{Error, Result};
use crate::output::json::format_json;
use crate::output::table::format_record;

/// Send `method path`; GETs use the fetch retry profile, everything else is
/// a mutation with CSRF handling.
pub async fn run(
    opts: &GlobalOptions,
    method: &str,
    path: &str,
    data: Option<&str>,
    params: &[(String, String)],
) -> Result<()> {
    let method = parse_method(method)?;
    let path = normalize_path(path);
    let ctx = CommandContext::new(opts).await?;

    let response = if method == Method::GET {
        if data.is_some() {
            return Err(Error::Other("--data is not allowed with GET".to_string()));
        }
        let query: QueryParams = params.iter().cloned().collect();
        ctx.runtime.fetch(&path, &query).await?
    } else {
        if !params.is_empty() {
            return Err(Error::Other(format!("--param is only allowed with GET, not {}", method)));
        }
        let body = data.map(parse_object).transpose()?;
        ctx.runtime.mutate(method, &path, body).await?
    };

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&response)?),
        OutputFormat::Table => println!("{}", format_record(&response)),
    }
    Ok(())
}

fn parse_method(raw: &str) -> Result<Method> {
    let method = Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::Other(format!("Invalid HTTP method: {}", raw)))?;
    match method {
        Method::GET | Method::POST | Method::PUT | Method::PATCH | Method::DELETE => Ok(method),
        other => Err(Error::Other(format!("Unsupported HTTP method: {}", other))),
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_case_insensitive() {
        assert_eq!(parse_method("patch").unwrap(), Method::PATCH);
        assert_eq!(parse_method("GET").unwrap(), Method::GET);
    }

    #[test]
    fn test_parse_method_rejects_others() {
        assert!(matches!(parse_method("OPTIONS"), Err(Error::Other(_))));
        assert!(matches!(parse_method("NOT A METHOD"), Err(Error::Other(_))));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("api/risks"), "/api/risks");
        assert_eq!(normalize_path("/api/risks"), "/api/risks");
    }
}
