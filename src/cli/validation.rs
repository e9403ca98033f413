use crate::cli::args::{HarvestArgs, ScanArgs};

pub fn validate_scan(args: &ScanArgs) -> Result<(), String> {
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err("invalid threads, expected at least 1".to_string());
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected a positive number of seconds".to_string());
        }
    }
    if let Some(marker) = args.marker.as_deref() {
        if marker.is_empty() {
            return Err("marker must not be empty".to_string());
        }
    }
    if let Some(raw) = args.output_format.as_deref() {
        if crate::output::OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid --output-format '{raw}', expected text or json"));
        }
    }
    if let Some(raw) = args.header.as_deref() {
        if !raw.contains(':') {
            return Err(format!("invalid --header '{raw}', expected 'Key: Value'"));
        }
    }
    Ok(())
}

pub fn validate_harvest(args: &HarvestArgs) -> Result<(), String> {
    if args.domain.is_some() && args.list.is_some() {
        return Err("use either --domain or --list, not both".to_string());
    }
    if let Some(raw) = args.extensions.as_deref() {
        crate::utils::parse_extensions_csv(raw)
            .map_err(|e| format!("invalid --extensions '{raw}': {e}"))?;
    }
    if let Some(placeholder) = args.placeholder.as_deref() {
        if placeholder.is_empty() {
            return Err("placeholder must not be empty".to_string());
        }
    }
    Ok(())
}
