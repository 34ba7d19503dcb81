//! Sample SPP (Surat Perintah Pembayaran, payment order) content.
//!
//! Used by `bmu-print --demo` and by the tests: the one-page letter, then a
//! payroll attachment on a fresh page whose table chunks across pages.

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use crate::document::DocumentOptions;
use crate::error::PrintError;
use crate::export::ExportDate;
use crate::markup::{escape_text, Block};
use crate::table::TableSource;

/// One payroll line of the SPP attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollRow {
    pub nip: String,
    pub name: String,
    pub position: String,
    pub base_salary: u64,
    pub allowance: u64,
}

impl PayrollRow {
    pub fn total(&self) -> u64 {
        self.base_salary + self.allowance
    }
}

/// Renders [`PayrollRow`]s as table markup.
pub struct PayrollTable;

impl TableSource<PayrollRow> for PayrollTable {
    fn render_header(&self) -> String {
        concat!(
            r#"<tr class="bg-gray-200">"#,
            r#"<th class="border p-2">No</th>"#,
            r#"<th class="border p-2">NIP</th>"#,
            r#"<th class="border p-2">Nama</th>"#,
            r#"<th class="border p-2">Jabatan</th>"#,
            r#"<th class="border p-2">Gaji Pokok</th>"#,
            r#"<th class="border p-2">Tunjangan</th>"#,
            r#"<th class="border p-2">Jumlah</th>"#,
            "</tr>"
        )
        .to_string()
    }

    fn render_row(&self, row: &PayrollRow, index: usize) -> String {
        format!(
            concat!(
                "<tr>",
                r#"<td class="border p-2 text-center">{}</td>"#,
                r#"<td class="border p-2">{}</td>"#,
                r#"<td class="border p-2">{}</td>"#,
                r#"<td class="border p-2">{}</td>"#,
                r#"<td class="border p-2 text-right">{}</td>"#,
                r#"<td class="border p-2 text-right">{}</td>"#,
                r#"<td class="border p-2 text-right">{}</td>"#,
                "</tr>"
            ),
            index + 1,
            escape_text(&row.nip),
            escape_text(&row.name),
            escape_text(&row.position),
            format_rupiah(row.base_salary),
            format_rupiah(row.allowance),
            format_rupiah(row.total()),
        )
    }

    fn row_key(&self, row: &PayrollRow, _index: usize) -> String {
        row.nip.clone()
    }
}

/// `1250000` → `Rp 1.250.000`.
pub fn format_rupiah(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    out.push_str("Rp ");
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

const NAMES: [&str; 10] = [
    "Siti Rahmawati",
    "Budi Santoso",
    "Dewi Lestari",
    "Agus Setiawan",
    "Rina Marlina",
    "Hendra Gunawan",
    "Nur Aisyah",
    "Joko Prasetyo",
    "Maya Sari",
    "Andi Firmansyah",
];

const POSITIONS: [&str; 4] = ["Staf Keuangan", "Staf SDM", "Kepala Bagian", "Teknisi"];

/// `count` deterministic payroll rows.
pub fn sample_payroll(count: usize) -> Vec<PayrollRow> {
    (0..count)
        .map(|i| PayrollRow {
            nip: format!("1987{:04}{:06}", 100 + i % 12, 2001 + i),
            name: NAMES[i % NAMES.len()].to_string(),
            position: POSITIONS[i % POSITIONS.len()].to_string(),
            base_salary: 3_500_000 + (i as u64 % 7) * 250_000,
            allowance: 750_000 + (i as u64 % 3) * 125_000,
        })
        .collect()
}

/// Header fields of one payment order.
#[derive(Debug, Clone, PartialEq)]
pub struct SppInfo {
    pub number: String,
    pub unit_code: String,
    pub unit_name: String,
    pub year: i32,
    pub month: u32,
}

impl SppInfo {
    /// The order used by `--demo`.
    pub fn sample() -> Self {
        Self {
            number: "001/SPP/BMU/X/2026".to_string(),
            unit_code: "UMUM".to_string(),
            unit_name: "Bagian Umum dan Keuangan".to_string(),
            year: 2026,
            month: 10,
        }
    }

    /// `Oktober 2026`
    pub fn period(&self) -> String {
        let dated = ExportDate::new(1, self.month, self.year).long_id();
        dated.split_once(' ').map(|(_, rest)| rest.to_string()).unwrap_or(dated)
    }

    pub fn doc_name(&self) -> String {
        format!(
            "Surat_Perintah_Pembayaran_{}_{}_{}",
            self.unit_code, self.year, self.month
        )
    }
}

/// Page setup of a printed SPP: 8.5×13 in with the BMU letterhead and
/// footer bands, the payroll attachment starting on page two.
pub fn spp_options(info: &SppInfo) -> DocumentOptions {
    DocumentOptions {
        doc_name: info.doc_name(),
        gap_px: 3.0,
        include_intro_reserve: false,
        break_before: Some(vec![false, true]),
        header_height_in: 1.4,
        footer_height_in: 1.7,
        page_width_in: 8.5,
        page_height_in: 13.0,
        content_padding_top_in: 0.2,
        content_padding_x_in: 1.0,
        ..DocumentOptions::default()
    }
}

/// The letter itself: title, instruction, payment summary, signature and
/// copy list. Fills most of page one.
pub fn spp_letter(info: &SppInfo, total: u64) -> Block {
    let period = escape_text(&info.period());
    Block::from_html(&format!(
        concat!(
            r#"<div class="flex flex-col">"#,
            r#"<p class="text-center leading-none"><span class="font-bold underline">SURAT PERINTAH PEMBAYARAN</span><br />"#,
            r#"<span>Nomor: {number}</span></p>"#,
            r#"<p class="mt-4 leading-relaxed">Sehubungan dengan kebijakan dan tanggung jawab perusahaan, "#,
            "dengan ini Direktur Utama PT Brawijaya Multi Usaha memberikan perintah kepada Divisi Keuangan ",
            "Unit Bisnis {unit} untuk melakukan pembayaran terhadap kewajiban perusahaan yang mencakup ",
            "rincian beban biaya karyawan Bulan {period} sebagai berikut:</p>",
            r#"<table class="w-full mt-4 text-sm">"#,
            r#"<tr><th class="border px-2 w-10 text-center">No</th>"#,
            r#"<th class="border px-2 text-center">Jenis Pembayaran</th>"#,
            r#"<th class="border px-2 text-center">Nominal (Rp)</th></tr>"#,
            r#"<tr><td class="border px-2 w-10 text-center">1</td>"#,
            r#"<td class="border px-2">Gaji dan tunjangan karyawan</td>"#,
            r#"<td class="border px-2 text-right">{total}</td></tr>"#,
            r#"<tr><td class="border px-2 w-10"></td>"#,
            r#"<td class="border px-2 py-1 font-semibold text-center">TOTAL</td>"#,
            r#"<td class="border px-2 py-1 font-semibold text-right">{total}</td></tr>"#,
            "</table>",
            r#"<p class="mt-4">Demikian Surat Perintah ini dibuat untuk dilaksanakan sebagaimana mestinya.</p>"#,
            r#"<div class="flex justify-between"><div></div><div class="mt-8">"#,
            r#"<p class="text-left leading-none"><span>Malang, {signed}</span><br /><span>Hormat kami,</span></p>"#,
            r#"<div class="h-20"></div>"#,
            r#"<p class="text-left leading-none"><span class="underline font-bold">Dr. EDI PURWANTO, S.TP., M.M.</span><br />"#,
            "<span>DIREKTUR UTAMA</span></p>",
            "</div></div>",
            r#"<div class="mt-12"><p class="font-semibold">Tembusan:</p>"#,
            r#"<table class="w-full mt-2 text-sm">"#,
            r#"<tr><td class="w-10 text-center">1.</td><td>Direktur Keuangan dan Manajemen Resiko;</td></tr>"#,
            r#"<tr><td class="w-10 text-center">2.</td><td>Direktur Operasional;</td></tr>"#,
            r#"<tr><td class="w-10 text-center">3.</td><td>General Manager Unit Bisnis Bersangkutan;</td></tr>"#,
            r#"<tr><td class="w-10 text-center">4.</td><td>Arsip.</td></tr>"#,
            "</table></div>",
            "</div>"
        ),
        number = escape_text(&info.number),
        unit = escape_text(&info.unit_name),
        period = period,
        total = format_rupiah(total),
        signed = ExportDate::new(24, info.month, info.year).long_id(),
    ))
}

/// The letter followed by the payroll attachment: a heading block, which
/// [`spp_options`] forces onto a new page, and the chunked tables.
pub fn spp_blocks(info: &SppInfo, payroll_tables: Vec<Block>, total: u64) -> Vec<Block> {
    let mut blocks = vec![
        spp_letter(info, total),
        Block::from_html(&format!(
            concat!(
                r#"<div class="text-center mb-2">"#,
                r#"<p class="font-bold">LAMPIRAN SURAT PERINTAH PEMBAYARAN</p>"#,
                "<p>Nomor: {}</p>",
                "<p>Rincian Gaji Karyawan Bulan {}</p>",
                "</div>"
            ),
            escape_text(&info.number),
            escape_text(&info.period())
        )),
    ];
    blocks.extend(payroll_tables);
    blocks.push(Block::from_html(&format!(
        r#"<p class="font-bold text-right">Jumlah yang dibayarkan: {}</p>"#,
        format_rupiah(total)
    )));
    blocks
}

/// A solid-colour PNG band as a data URI, used as letterhead artwork when
/// no header or footer image is given.
pub fn band_image(width: u32, height: u32, rgb: [u8; 3]) -> Result<String, PrintError> {
    let img = image::RgbaImage::from_pixel(width.max(1), height.max(1), image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| PrintError::Asset(format!("png encode failed: {e}")))?;
    Ok(format!("data:image/png;base64,{}", BASE64_STD.encode(bytes)))
}
