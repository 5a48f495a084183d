use crate::devices::ScannedDevice;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl DeviceTable {
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Replaces the whole body. Rows keep the order the backend sent them in.
    pub fn rebuild<D: ScannedDevice>(&mut self, devices: &[D]) {
        self.clear();
        self.columns = D::COLUMNS.to_vec();
        for device in devices {
            self.rows.push(device.cells());
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header plus body as CSV, exactly as currently rendered.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, self.columns.iter().copied());
        for row in &self.rows {
            push_record(&mut out, row.iter().map(String::as_str));
        }
        out
    }
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}
