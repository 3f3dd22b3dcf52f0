//! Builders for PDB fixture text.

/// One fixed-column PDB coordinate record
pub fn pdb_record(record: &str, serial: u32, atom: &str, residue: &str, xyz: [f64; 3]) -> String {
    format!(
        "{record:<6}{serial:>5} {atom:<4} {residue:>3} A{seq:>4}    {x:>8.3}{y:>8.3}{z:>8.3}  1.00  0.00",
        seq = serial,
        x = xyz[0],
        y = xyz[1],
        z = xyz[2],
    )
}

/// Builder for small PDB files
#[derive(Debug, Default)]
pub struct PdbBuilder {
    lines: Vec<String>,
}

impl PdbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atom(mut self, xyz: [f64; 3]) -> Self {
        let serial = self.lines.len() as u32 + 1;
        self.lines.push(pdb_record("ATOM", serial, "CA", "ALA", xyz));
        self
    }

    pub fn ligand_atom(mut self, xyz: [f64; 3]) -> Self {
        let serial = self.lines.len() as u32 + 1;
        self.lines.push(pdb_record("HETATM", serial, "C1", "LIG", xyz));
        self
    }

    pub fn water(mut self, xyz: [f64; 3]) -> Self {
        let serial = self.lines.len() as u32 + 1;
        self.lines.push(pdb_record("HETATM", serial, "O", "HOH", xyz));
        self
    }

    pub fn build(self) -> String {
        let mut text = self.lines.join("\n");
        text.push_str("\nEND\n");
        text
    }
}
