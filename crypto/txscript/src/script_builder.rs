use crate::data_stack::serialize_number;
use crate::opcodes::*;

/// Builds scripts with canonical data pushes: each datum is encoded with the
/// smallest push instruction able to carry it.
#[derive(Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(mut self, op: u8) -> Self {
        self.script.push(op);
        self
    }

    pub fn add_data(mut self, data: &[u8]) -> Self {
        match data.len() {
            0 => self.script.push(OP_0),
            1 if data[0] == 0 => self.script.push(OP_0),
            1 if (1..=16).contains(&data[0]) => self.script.push(OP_1 - 1 + data[0]),
            1 if data[0] == 0x81 => self.script.push(OP_1NEGATE),
            len if len <= OP_DATA_75 as usize => {
                self.script.push(len as u8);
                self.script.extend_from_slice(data);
            }
            len if len <= u8::MAX as usize => {
                self.script.push(OP_PUSHDATA1);
                self.script.push(len as u8);
                self.script.extend_from_slice(data);
            }
            len if len <= u16::MAX as usize => {
                self.script.push(OP_PUSHDATA2);
                self.script.extend_from_slice(&(len as u16).to_le_bytes());
                self.script.extend_from_slice(data);
            }
            len => {
                self.script.push(OP_PUSHDATA4);
                self.script.extend_from_slice(&(len as u32).to_le_bytes());
                self.script.extend_from_slice(data);
            }
        }
        self
    }

    pub fn add_i64(self, value: i64) -> Self {
        if value == 0 {
            return self.add_op(OP_0);
        }
        if value == -1 || (1..=16).contains(&value) {
            let op = if value == -1 { OP_1NEGATE } else { OP_1 - 1 + value as u8 };
            return self.add_op(op);
        }
        let encoded = serialize_number(value);
        self.add_data(&encoded)
    }

    pub fn build(self) -> Vec<u8> {
        self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::parse_script_strict;

    #[test]
    fn test_canonical_pushes() {
        assert_eq!(ScriptBuilder::new().add_data(&[]).build(), vec![OP_0]);
        assert_eq!(ScriptBuilder::new().add_data(&[5]).build(), vec![OP_1 + 4]);
        assert_eq!(ScriptBuilder::new().add_data(&[0x81]).build(), vec![OP_1NEGATE]);
        assert_eq!(ScriptBuilder::new().add_data(&[0xaa, 0xbb]).build(), vec![2, 0xaa, 0xbb]);

        let long = vec![7u8; 80];
        let script = ScriptBuilder::new().add_data(&long).build();
        assert_eq!(script[0], OP_PUSHDATA1);
        assert_eq!(script[1], 80);
        let parsed = parse_script_strict(&script).unwrap();
        assert_eq!(parsed[0].data, long.as_slice());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(ScriptBuilder::new().add_i64(0).build(), vec![OP_0]);
        assert_eq!(ScriptBuilder::new().add_i64(16).build(), vec![OP_16]);
        assert_eq!(ScriptBuilder::new().add_i64(-1).build(), vec![OP_1NEGATE]);
        assert_eq!(ScriptBuilder::new().add_i64(1000).build(), vec![2, 0xe8, 0x03]);
    }
}
