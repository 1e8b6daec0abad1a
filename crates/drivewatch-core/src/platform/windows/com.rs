/// COM apartment and WMI connection helpers.
///
/// COM interface pointers are bound to the thread that created them, so
/// every [`Session`] owns its own apartment guard and is never sent across
/// threads. The service creates one per query; the event source creates one
/// on the monitor thread and keeps it for the life of the subscription.
use crate::service::{RawValue, Row};
use ::windows::core::{Interface, BSTR, HSTRING, IUnknown, PCWSTR, VARIANT};
use ::windows::Win32::Foundation::{RPC_E_CHANGED_MODE, RPC_E_TOO_LATE};
use ::windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoInitializeSecurity, CoSetProxyBlanket, CoUninitialize,
    CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, EOAC_NONE, RPC_C_AUTHN_LEVEL_CALL,
    RPC_C_AUTHN_LEVEL_DEFAULT, RPC_C_IMP_LEVEL_IMPERSONATE,
};
use ::windows::Win32::System::Rpc::{RPC_C_AUTHN_WINNT, RPC_C_AUTHZ_NONE};
use ::windows::Win32::System::Variant::{
    VT_BOOL, VT_BSTR, VT_EMPTY, VT_I1, VT_I2, VT_I4, VT_I8, VT_NULL, VT_UI1, VT_UI2, VT_UI4,
    VT_UI8, VT_UNKNOWN,
};
use ::windows::Win32::System::Wmi::{
    IEnumWbemClassObject, IWbemClassObject, IWbemLocator, IWbemServices, WbemLocator,
    WBEM_FLAG_FORWARD_ONLY, WBEM_FLAG_RETURN_IMMEDIATELY, WBEM_INFINITE,
};
use tracing::debug;

/// Default WMI namespace.
pub const CIMV2_NAMESPACE: &str = "ROOT\\CIMV2";

/// Keeps COM initialized on the current thread.
struct ComGuard {
    uninitialize: bool,
}

impl ComGuard {
    fn new() -> ::windows::core::Result<Self> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        // A host that already entered an STA on this thread keeps it; we
        // just don't own the matching CoUninitialize.
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self {
                uninitialize: false,
            });
        }
        hr.ok()?;
        let guard = Self { uninitialize: true };

        let security = unsafe {
            CoInitializeSecurity(
                None,
                -1,
                None,
                None,
                RPC_C_AUTHN_LEVEL_DEFAULT,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                None,
                EOAC_NONE,
                None,
            )
        };
        match security {
            Ok(()) => {}
            // Process-wide and settable once; later calls are expected.
            Err(e) if e.code() == RPC_E_TOO_LATE => {}
            Err(e) => return Err(e),
        }
        Ok(guard)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.uninitialize {
            unsafe { CoUninitialize() };
        }
    }
}

/// A connection to one WMI namespace.
pub struct Session {
    // Field order matters: the proxy is released before COM is torn down.
    services: IWbemServices,
    _com: ComGuard,
}

impl Session {
    pub fn connect(namespace: &str) -> ::windows::core::Result<Self> {
        let com = ComGuard::new()?;

        let services = unsafe {
            let locator: IWbemLocator = CoCreateInstance(&WbemLocator, None, CLSCTX_INPROC_SERVER)?;
            let services = locator.ConnectServer(
                &BSTR::from(namespace),
                &BSTR::new(),
                &BSTR::new(),
                &BSTR::new(),
                0,
                &BSTR::new(),
                None,
            )?;
            CoSetProxyBlanket(
                &services,
                RPC_C_AUTHN_WINNT,
                RPC_C_AUTHZ_NONE,
                PCWSTR::null(),
                RPC_C_AUTHN_LEVEL_CALL,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                None,
                EOAC_NONE,
            )?;
            services
        };

        debug!("WMI: connected to {}", namespace);
        Ok(Self {
            services,
            _com: com,
        })
    }

    /// Run a WQL query and read `fields` from every returned object.
    pub fn query(&self, wql: &str, fields: &[String]) -> ::windows::core::Result<Vec<Row>> {
        let enumerator = unsafe {
            self.services.ExecQuery(
                &BSTR::from("WQL"),
                &BSTR::from(wql),
                WBEM_FLAG_FORWARD_ONLY | WBEM_FLAG_RETURN_IMMEDIATELY,
                None,
            )?
        };

        let mut rows = Vec::new();
        while let Some(object) = next_object(&enumerator, WBEM_INFINITE.0)?.object {
            rows.push(read_row(&object, fields));
        }
        Ok(rows)
    }

    /// Start a semisynchronous event query.
    pub fn notifications(&self, wql: &str) -> ::windows::core::Result<IEnumWbemClassObject> {
        unsafe {
            self.services.ExecNotificationQuery(
                &BSTR::from("WQL"),
                &BSTR::from(wql),
                WBEM_FLAG_FORWARD_ONLY | WBEM_FLAG_RETURN_IMMEDIATELY,
                None,
            )
        }
    }
}

/// Outcome of one `IEnumWbemClassObject::Next` call.
pub struct Fetched {
    pub object: Option<IWbemClassObject>,
    /// The wait elapsed before an object arrived.
    pub timed_out: bool,
}

/// Fetch the next object, waiting at most `timeout_ms` (`-1` for ever).
pub fn next_object(
    enumerator: &IEnumWbemClassObject,
    timeout_ms: i32,
) -> ::windows::core::Result<Fetched> {
    let mut objects = [None; 1];
    let mut returned = 0u32;
    let hr = unsafe { enumerator.Next(timeout_ms, &mut objects, &mut returned) };
    hr.ok()?;

    let [object] = objects;
    Ok(Fetched {
        timed_out: returned == 0 && hr.0 == ::windows::Win32::System::Wmi::WBEM_S_TIMEDOUT.0,
        object: if returned == 0 { None } else { object },
    })
}

/// Read `fields` from `object`. Missing properties are left out of the row.
pub fn read_row(object: &IWbemClassObject, fields: &[String]) -> Row {
    fields
        .iter()
        .filter_map(|field| get(object, field).map(|value| (field.clone(), value)))
        .collect()
}

/// One property as a raw value. `None` if the class has no such property.
pub fn get(object: &IWbemClassObject, name: &str) -> Option<RawValue> {
    let name = HSTRING::from(name);
    let mut value = VARIANT::default();
    unsafe { object.Get(PCWSTR(name.as_ptr()), 0, &mut value, None, None) }.ok()?;
    Some(raw_value(&value))
}

/// An embedded object property, e.g. `TargetInstance` of an event.
pub fn get_object(object: &IWbemClassObject, name: &str) -> Option<IWbemClassObject> {
    let name = HSTRING::from(name);
    let mut value = VARIANT::default();
    unsafe { object.Get(PCWSTR(name.as_ptr()), 0, &mut value, None, None) }.ok()?;
    IUnknown::try_from(&value).ok()?.cast().ok()
}

fn raw_value(value: &VARIANT) -> RawValue {
    let vt = unsafe { value.as_raw().Anonymous.Anonymous.vt };
    let unsigned = |v: &VARIANT| u64::try_from(v).map(RawValue::U64).unwrap_or(RawValue::Null);

    match vt {
        t if t == VT_EMPTY.0 || t == VT_NULL.0 || t == VT_UNKNOWN.0 => RawValue::Null,
        t if t == VT_BSTR.0 => BSTR::try_from(value)
            .map(|s| RawValue::Text(s.to_string()))
            .unwrap_or(RawValue::Null),
        t if t == VT_BOOL.0 => bool::try_from(value)
            .map(RawValue::Bool)
            .unwrap_or(RawValue::Null),
        // WMI hands uint32 out as VT_I4; reinterpret the bits.
        t if t == VT_I4.0 => i32::try_from(value)
            .map(|v| RawValue::U32(v as u32))
            .unwrap_or(RawValue::Null),
        t if t == VT_UI4.0 || t == VT_UI1.0 || t == VT_UI2.0 || t == VT_I1.0 || t == VT_I2.0 => {
            u32::try_from(value)
                .map(RawValue::U32)
                .unwrap_or(RawValue::Null)
        }
        t if t == VT_UI8.0 || t == VT_I8.0 => unsigned(value),
        _ => BSTR::try_from(value)
            .map(|s| RawValue::Text(s.to_string()))
            .unwrap_or(RawValue::Null),
    }
}
