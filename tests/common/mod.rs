// Copyright 2026 Infomed Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use serde_json::json;

pub const DUMP: &str = r#"{"table":"Specialite","SpecId":"60234100","SpecDenom01":"DOLIPRANE 1000 mg, comprimé","SpecGeneId":"1"}
{"table":"Specialite","SpecId":"60234200","SpecDenom01":"DOLIPRANE 500 mg, gélule","SpecGeneId":"1"}
{"table":"Specialite","SpecId":"61266250","SpecDenom01":"ADVIL 200 mg, comprimé enrobé","SpecGeneId":null}
{"table":"Specialite","SpecId":"69999999","SpecDenom01":"EFFERALGAN 1 g, comprimé","SpecGeneId":"1"}
{"table":"Subs_Nom","NomId":"02202","NomLib":"PARACÉTAMOL"}
{"table":"Subs_Nom","NomId":"01504","NomLib":"IBUPROFÈNE"}
{"table":"Subs_Nom","NomId":"09999","NomLib":"CODÉINE"}
{"table":"Composant","SpecId":"60234100","NomId":"02202","CompoDosage":"1000 mg"}
{"table":"Composant","SpecId":"60234200","NomId":"02202","CompoDosage":"500 mg"}
{"table":"Composant","SpecId":"61266250","NomId":"01504","CompoDosage":"200 mg"}
{"table":"Composant","SpecId":"69999999","NomId":"02202","CompoDosage":"1 g"}
{"table":"Composant","SpecId":"69999999","NomId":"09999","CompoDosage":"30 mg"}
{"table":"GroupeGene","SpecId":"1","LibLong":"PARACETAMOL 1000 mg - DOLIPRANE 1000 mg, comprimé"}
"#;

pub const LEAFLET: &str = "<html><head><title>Notice</title></head><body>\
<p class=\"DateNotif\">Dernière mise à jour : 12/03/2024</p>\
<p class=\"AmmAnnexeTitre\">ANNEXE IIIB</p>\
<p><a name=\"Ann3bDenomination\"></a>Dénomination du médicament</p>\
<p>DOLIPRANE 1000 mg, comprimé</p>\
<p>1. QU’EST-CE QU’EST DOLIPRANE ?</p>\
<p>Antalgique et antipyrétique.</p>\
<p><a name=\"Ann3bInfoNecessaires\"></a>2. QUELLES SONT LES INFORMATIONS A CONNAITRE</p>\
<p>Ne prenez jamais DOLIPRANE en cas d’allergie.</p>\
<p><a name=\"Ann3bCommentPrendre\"></a>3. COMMENT PRENDRE DOLIPRANE ?</p>\
<p>Voie orale.</p>\
<p><a name=\"Ann3bEffetsIndesirables\"></a>4. EFFETS INDÉSIRABLES</p>\
<p>Rares.</p>\
<p><a name=\"Ann3bConservation\"></a>5. COMMENT CONSERVER DOLIPRANE ?</p>\
<p>A conserver à température ambiante.</p>\
<p><a name=\"Ann3bEmballage\"></a>6. CONTENU DE L’EMBALLAGE</p>\
<p>Comprimé blanc.</p>\
</body></html>";

pub fn infomed_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("infomed"))
}

fn write_archive(path: &Path) {
    let file = fs::File::create(path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    let broken = LEAFLET.replace("DateNotif", "Other");
    for (cis, html) in [("60234100", LEAFLET), ("61266250", broken.as_str())] {
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(html);
        zip.start_file(format!("Notices_RCP_html/{cis}_notice.htm"), options)
            .expect("start entry");
        zip.write_all(&bytes).expect("write entry");
    }
    zip.finish().expect("finish zip");
}

/// Runs `infomed init`, writes the reference files and imports the dump.
pub fn seed_site(root: &Path) {
    let output = infomed_cmd()
        .args(["init", "."])
        .current_dir(root)
        .output()
        .expect("init");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    fs::write(root.join("dump.jsonl"), DUMP).expect("write dump");
    fs::write(
        root.join("liste_CIS_MVP.json"),
        r#"["60234100", "60234200", "61266250"]"#,
    )
    .expect("write allow-list");
    fs::write(root.join("CIS-ATC.csv"), "60234100,N02BE01\n61266250,M01AE01\n")
        .expect("write atc");
    write_archive(&root.join("Notices_RCP_html.zip"));

    let output = infomed_cmd()
        .args(["import", "dump.jsonl"])
        .current_dir(root)
        .output()
        .expect("import");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn normalize_json(mut value: Value) -> Value {
    if let Some(stats) = value.get_mut("stats")
        && let Some(obj) = stats.as_object_mut()
    {
        obj.insert("took_ms".to_string(), json!(0));
        if let Some(store) = obj.get_mut("store")
            && let Some(store_obj) = store.as_object_mut()
        {
            store_obj.insert("db_size_bytes".to_string(), json!(0));
            store_obj.insert("imported_at".to_string(), json!(""));
        }
    }
    value
}

pub fn run_json(cmd: &mut Command, cwd: &Path) -> Value {
    let output = cmd.current_dir(cwd).output().expect("run command");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("parse json")
}
