/// WQL rendering of [`Query`] values and the drive notification query.
use crate::service::Query;

/// Drive letter added or removed. WMI polls the provider every 3 seconds.
pub const DRIVE_NOTIFICATION_QUERY: &str = "SELECT * FROM __InstanceOperationEvent WITHIN 3 \
     WHERE TargetInstance ISA 'Win32_LogicalDisk' \
     AND (__CLASS = '__InstanceCreationEvent' OR __CLASS = '__InstanceDeletionEvent')";

/// Escape a string literal for a WQL `WHERE` clause.
///
/// Backslashes and both quote characters are prefixed with a backslash.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `SELECT a, b FROM Provider [WHERE field = "value"]`.
pub fn render(query: &Query) -> String {
    let fields = if query.fields.is_empty() {
        "*".to_owned()
    } else {
        query.fields.join(", ")
    };

    let mut wql = format!("SELECT {} FROM {}", fields, query.provider);
    if let Some(filter) = &query.filter {
        wql.push_str(&format!(" WHERE {} = \"{}\"", filter.field, escape(&filter.value)));
    }
    wql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("E:"), "E:");
        assert_eq!(
            escape("\\\\HOST\\root\\cimv2:Win32_LogicalDisk.DeviceID=\"E:\""),
            "\\\\\\\\HOST\\\\root\\\\cimv2:Win32_LogicalDisk.DeviceID=\\\"E:\\\""
        );
        assert_eq!(escape("it's"), "it\\'s");
    }

    #[test]
    fn test_render_with_filter() {
        let q = Query::new("Win32_LogicalDisk", ["__PATH", "VolumeSerialNumber"]).filter("DeviceID", "E:");
        assert_eq!(
            render(&q),
            "SELECT __PATH, VolumeSerialNumber FROM Win32_LogicalDisk WHERE DeviceID = \"E:\""
        );
    }

    #[test]
    fn test_render_without_fields_or_filter() {
        let q = Query::new("Win32_LogicalDisk", Vec::<String>::new());
        assert_eq!(render(&q), "SELECT * FROM Win32_LogicalDisk");
    }
}
