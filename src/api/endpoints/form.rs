//! Browser form for submitting an X-ray with patient details.

use axum::response::Html;

/// `GET /`
pub async fn page() -> Html<&'static str> {
    Html(REPORT_FORM_HTML)
}

// Self-contained page, no external resources
const REPORT_FORM_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Chest X-ray Report Generator</title>
  <style>
    * { box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', system-ui, sans-serif;
      background: #f5f7fa; color: #1f2933; margin: 0; padding: 32px 16px;
    }
    main { max-width: 720px; margin: 0 auto; }
    h1 { font-size: 26px; margin: 0 0 4px; }
    p.lead { color: #52606d; margin: 0 0 24px; }
    form { background: white; border-radius: 12px; padding: 24px; border: 1px solid #d9e2ec; }
    h2 { font-size: 17px; margin: 0 0 16px; }
    .row { display: flex; gap: 16px; }
    .row > label { flex: 1; }
    label { display: block; font-size: 14px; font-weight: 500; margin-bottom: 14px; }
    input, textarea {
      display: block; width: 100%; margin-top: 6px; padding: 10px;
      border: 1px solid #bcccdc; border-radius: 8px; font: inherit;
    }
    textarea { min-height: 72px; resize: vertical; }
    button {
      background: #336699; color: white; border: none; border-radius: 8px;
      padding: 14px 20px; font-size: 16px; font-weight: 500; cursor: pointer; width: 100%;
    }
    button:disabled { opacity: 0.5; cursor: wait; }
    #preview { max-width: 100%; max-height: 320px; margin: 0 0 14px; display: none; border-radius: 8px; }
    #result { margin-top: 24px; display: none; }
    #findings {
      white-space: pre-wrap; background: white; border: 1px solid #d9e2ec;
      border-radius: 8px; padding: 16px; font-size: 15px; line-height: 1.5;
    }
    #download { display: inline-block; margin-top: 12px; color: #336699; font-weight: 600; }
    .error { color: #c0392b; margin-top: 16px; }
  </style>
</head>
<body>
<main>
  <h1>Chest X-ray Report Generator</h1>
  <p class="lead">Upload a chest X-ray image and fill in patient details to generate a formatted PDF report.</p>

  <form id="report-form">
    <h2>Patient Details</h2>
    <label>Patient's Name <input name="name" autocomplete="off"></label>
    <label>Referred by <input name="referred_by" autocomplete="off"></label>
    <div class="row">
      <label>Date Taken <input type="date" name="date_taken"></label>
      <label>Date of Report <input type="date" name="date_of_report"></label>
    </div>
    <label>Patient's Complaint <textarea name="complaint"></textarea></label>
    <label>Patient's History <textarea name="history"></textarea></label>
    <label>Upload Chest X-ray <input type="file" name="xray" id="xray" accept=".png,.jpg,.jpeg,image/png,image/jpeg" required></label>
    <img id="preview" alt="Uploaded X-ray">
    <button type="submit" id="submit">Generate Report</button>
    <div class="error" id="error"></div>
  </form>

  <section id="result">
    <h2>Generated Findings</h2>
    <div id="findings"></div>
    <a id="download" href="#">Download Report as PDF</a>
  </section>
</main>

<script>
  var form = document.getElementById('report-form');
  var fileInput = document.getElementById('xray');
  var preview = document.getElementById('preview');
  var submitBtn = document.getElementById('submit');
  var errorEl = document.getElementById('error');
  var resultEl = document.getElementById('result');
  var findingsEl = document.getElementById('findings');
  var downloadEl = document.getElementById('download');

  var today = new Date().toISOString().slice(0, 10);
  form.date_taken.value = today;
  form.date_of_report.value = today;

  fileInput.addEventListener('change', function() {
    var file = fileInput.files[0];
    if (!file) { preview.style.display = 'none'; return; }
    preview.src = URL.createObjectURL(file);
    preview.style.display = 'block';
  });

  form.addEventListener('submit', function(e) {
    e.preventDefault();
    errorEl.textContent = '';
    resultEl.style.display = 'none';
    submitBtn.disabled = true;
    submitBtn.textContent = 'Analyzing image and generating report...';

    fetch('/api/reports', { method: 'POST', body: new FormData(form) })
      .then(function(res) {
        return res.json().then(function(body) { return { ok: res.ok, body: body }; });
      })
      .then(function(r) {
        if (!r.ok) throw new Error(r.body.error ? r.body.error.message : 'Request failed');
        findingsEl.textContent = r.body.findings || '(no findings generated)';
        downloadEl.href = r.body.download_url;
        downloadEl.setAttribute('download', r.body.report_name + '.pdf');
        resultEl.style.display = 'block';
      })
      .catch(function(err) {
        errorEl.textContent = err.message;
      })
      .then(function() {
        submitBtn.disabled = false;
        submitBtn.textContent = 'Generate Report';
      });
  });
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_complete_document() {
        // The download anchor's `href="#"` must not end the literal early
        assert!(REPORT_FORM_HTML.contains(r##"<a id="download" href="#">"##));
        assert!(REPORT_FORM_HTML.trim_end().ends_with("</html>"));
        assert!(REPORT_FORM_HTML.contains("</script>"));
    }

    #[tokio::test]
    async fn page_serves_form_markup() {
        let Html(body) = page().await;
        assert!(body.starts_with("<!DOCTYPE html>"));
        assert!(body.contains(r#"name="xray""#));
    }
}
