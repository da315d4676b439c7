//! Browser pages served as static HTML; every piece of data comes from `/api`.

pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Student Performance Prediction System - Login</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 480px; margin: 60px auto; padding: 20px; }
        .container { background: #f5f5f5; padding: 25px; border-radius: 10px; }
        .form-group { margin: 15px 0; }
        label { display: block; margin-bottom: 5px; font-weight: bold; }
        input { width: 100%; padding: 10px; border: 1px solid #ddd; border-radius: 4px; box-sizing: border-box; }
        button { background: #007bff; color: white; padding: 12px 24px; border: none; border-radius: 4px; cursor: pointer; width: 100%; }
        button:hover { background: #0056b3; }
        .result { margin-top: 20px; padding: 15px; border-radius: 5px; display: none; }
        .fail { background: #f8d7da; color: #721c24; border: 1px solid #f5c6cb; }
    </style>
</head>
<body>
    <div class="container">
        <h1>🎓 Student Performance Prediction System</h1>
        <p>Please log in to access the dashboard.</p>

        <div class="form-group">
            <label for="username">Username:</label>
            <input type="text" id="username" placeholder="Enter your username">
        </div>
        <div class="form-group">
            <label for="password">Password:</label>
            <input type="password" id="password" placeholder="Enter your password">
        </div>

        <button onclick="login()">🔐 Login</button>
        <p>Don't have an account? <a href="/signup">Sign up here</a></p>

        <div id="result" class="result fail"></div>
    </div>

    <script>
        async function login() {
            const resultDiv = document.getElementById('result');
            try {
                const response = await fetch('/api/login', {
                    method: 'POST',
                    headers: {'Content-Type': 'application/json'},
                    body: JSON.stringify({
                        username: document.getElementById('username').value,
                        password: document.getElementById('password').value
                    })
                });
                if (response.ok) {
                    window.location.href = '/';
                    return;
                }
                const data = await response.json();
                resultDiv.style.display = 'block';
                resultDiv.innerHTML = `<p>❌ ${data.error}</p>` + data.details.map(d => `<p>${d}</p>`).join('');
            } catch (error) {
                resultDiv.style.display = 'block';
                resultDiv.innerHTML = `<p>Error: ${error.message}</p>`;
            }
        }
    </script>
</body>
</html>
"#;

pub const SIGNUP_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Student Performance Prediction System - Sign Up</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 480px; margin: 60px auto; padding: 20px; }
        .container { background: #f5f5f5; padding: 25px; border-radius: 10px; }
        .form-group { margin: 15px 0; }
        label { display: block; margin-bottom: 5px; font-weight: bold; }
        input { width: 100%; padding: 10px; border: 1px solid #ddd; border-radius: 4px; box-sizing: border-box; }
        button { background: #28a745; color: white; padding: 12px 24px; border: none; border-radius: 4px; cursor: pointer; width: 100%; }
        .hint { font-size: 12px; color: #6c757d; }
        .result { margin-top: 20px; padding: 15px; border-radius: 5px; display: none; }
        .pass { background: #d4edda; color: #155724; border: 1px solid #c3e6cb; }
        .fail { background: #f8d7da; color: #721c24; border: 1px solid #f5c6cb; }
    </style>
</head>
<body>
    <div class="container">
        <h1>📝 Create Account</h1>

        <div class="form-group">
            <label for="full_name">Full Name:</label>
            <input type="text" id="full_name">
        </div>
        <div class="form-group">
            <label for="username">Username:</label>
            <input type="text" id="username">
            <span class="hint">At least 3 characters</span>
        </div>
        <div class="form-group">
            <label for="email">Email:</label>
            <input type="email" id="email">
        </div>
        <div class="form-group">
            <label for="password">Password:</label>
            <input type="password" id="password">
            <span class="hint">At least 8 characters with upper case, lower case and a number</span>
        </div>
        <div class="form-group">
            <label for="confirm_password">Confirm Password:</label>
            <input type="password" id="confirm_password">
        </div>

        <button onclick="signup()">✅ Sign Up</button>
        <p>Already have an account? <a href="/">Log in</a></p>

        <div id="result" class="result"></div>
    </div>

    <script>
        async function signup() {
            const fields = ['full_name', 'username', 'email', 'password', 'confirm_password'];
            const body = {};
            fields.forEach(f => body[f] = document.getElementById(f).value);
            const resultDiv = document.getElementById('result');

            try {
                const response = await fetch('/api/signup', {
                    method: 'POST',
                    headers: {'Content-Type': 'application/json'},
                    body: JSON.stringify(body)
                });
                const data = await response.json();
                resultDiv.style.display = 'block';
                if (response.ok) {
                    resultDiv.className = 'result pass';
                    resultDiv.innerHTML = `<p>${data.message}</p><p><a href="/">Go to login</a></p>`;
                } else {
                    resultDiv.className = 'result fail';
                    resultDiv.innerHTML = `<p>❌ ${data.error}</p>` + data.details.map(d => `<p>• ${d}</p>`).join('');
                }
            } catch (error) {
                resultDiv.style.display = 'block';
                resultDiv.className = 'result fail';
                resultDiv.innerHTML = `<p>Error: ${error.message}</p>`;
            }
        }
    </script>
</body>
</html>
"#;

pub const DASHBOARD_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Student Performance Prediction Dashboard</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 1100px; margin: 30px auto; padding: 20px; }
        .container { background: #f5f5f5; padding: 25px; border-radius: 10px; }
        .form-group { margin: 15px 0; }
        label { display: block; margin-bottom: 5px; font-weight: bold; }
        input { padding: 8px; border: 1px solid #ddd; border-radius: 4px; }
        button { background: #007bff; color: white; padding: 10px 20px; border: none; border-radius: 4px; cursor: pointer; margin: 5px; }
        button:hover { background: #0056b3; }
        .header { display: flex; justify-content: space-between; align-items: center; }
        .section { background: white; padding: 20px; border-radius: 10px; margin: 20px 0; }
        .grid { display: grid; grid-template-columns: repeat(4, 1fr); gap: 15px; }
        .metric { background: white; padding: 15px; border-radius: 8px; border-left: 4px solid #007bff; }
        .metric p { font-size: 22px; margin: 0; color: #007bff; }
        .table { width: 100%; border-collapse: collapse; margin: 15px 0; }
        .table th, .table td { padding: 8px; text-align: left; border-bottom: 1px solid #ddd; }
        .table th { background: #f8f9fa; }
        .on-track { color: #28a745; font-weight: bold; }
        .attention { color: #dc3545; font-weight: bold; }
        .bar { background: #007bff; height: 14px; border-radius: 3px; }
        .error { background: #f8d7da; color: #721c24; border: 1px solid #f5c6cb; padding: 15px; border-radius: 5px; }
        pre { background: #272822; color: #f8f8f2; padding: 15px; border-radius: 5px; overflow-x: auto; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>📊 Student Performance Dashboard</h1>
            <div><span id="welcome"></span> <button onclick="logout()" style="background: #6c757d;">Logout</button></div>
        </div>

        <div class="section">
            <h3>📁 Data & Model Settings</h3>
            <div class="form-group">
                <label for="file">Upload CSV (basic or detailed format; leave empty for sample data):</label>
                <input type="file" id="file" accept=".csv">
            </div>
            <div class="form-group">
                <label for="test_size">Test Size: <span id="test_size_value">0.2</span></label>
                <input type="range" id="test_size" min="0.1" max="0.5" step="0.05" value="0.2"
                       oninput="document.getElementById('test_size_value').textContent = this.value">
            </div>
            <div class="form-group">
                <label for="random_state">Random State:</label>
                <input type="number" id="random_state" min="0" max="100" value="42">
            </div>
            <button onclick="runPipeline()">🚀 Run Prediction</button>
            <button onclick="download('/api/export/csv', 'processed_data.csv')" style="background: #28a745;">📥 Processed CSV</button>
            <button onclick="download('/api/export/log' + query(), null)" style="background: #fd7e14;">📝 Prediction Log</button>
            <button onclick="saveRecords()" style="background: #6f42c1;">💾 Save Records</button>
            <div id="status"></div>
        </div>

        <div id="results" style="display: none;">
            <div class="grid" id="metrics"></div>
            <div class="section"><h3>🧮 Feature Importance</h3><div id="importance"></div></div>
            <div class="section"><h3>📉 Prediction Error Distribution</h3><div id="errors"></div></div>
            <div class="section"><h3>🎯 Student Predictions</h3><div id="predictions"></div></div>
            <div class="section" id="summaries"></div>
            <div class="section"><h3>📝 Prediction Log</h3><div id="log-header"></div><pre id="log"></pre></div>
        </div>
    </div>

    <script>
        function query() {
            const testSize = document.getElementById('test_size').value;
            const randomState = document.getElementById('random_state').value;
            return `?test_size=${testSize}&random_state=${randomState}`;
        }

        async function uploadBody() {
            const file = document.getElementById('file').files[0];
            return file ? await file.text() : '';
        }

        function showError(data) {
            document.getElementById('status').innerHTML =
                `<div class="error"><p>❌ ${data.error}</p>${(data.details || []).map(d => `<p>${d}</p>`).join('')}</div>`;
        }

        function table(headers, rows) {
            return `<table class="table"><thead><tr>${headers.map(h => `<th>${h}</th>`).join('')}</tr></thead>
                <tbody>${rows.map(r => `<tr>${r.map(c => `<td>${c}</td>`).join('')}</tr>`).join('')}</tbody></table>`;
        }

        function fmt(value, places) {
            return value === null || value === undefined ? 'nan' : value.toFixed(places);
        }

        async function runPipeline() {
            document.getElementById('status').innerHTML = '<p>Running...</p>';
            const response = await fetch('/api/predict' + query(), { method: 'POST', body: await uploadBody() });
            const data = await response.json();
            if (!response.ok) { showError(data); return; }
            document.getElementById('status').innerHTML = `<p>✅ ${data.source}: ${data.rows} records (${data.schema} format)</p>`;
            render(data);
        }

        function render(d) {
            document.getElementById('results').style.display = 'block';
            document.getElementById('metrics').innerHTML = [
                ['R² Score', fmt(d.metrics.r2, 4)],
                ['Mean Squared Error', fmt(d.metrics.mse, 4)],
                ['Training Samples', d.train_rows],
                ['Testing Samples', d.test_rows]
            ].map(([k, v]) => `<div class="metric"><h4>${k}</h4><p>${v}</p></div>`).join('');

            const maxImpact = Math.max(...d.impact.map(f => f.impact), 1e-9);
            document.getElementById('importance').innerHTML = table(
                ['Feature', 'Coefficient', 'Impact'],
                d.impact.map(f => [f.feature, fmt(f.coefficient, 4),
                    `<div class="bar" style="width: ${100 * f.impact / maxImpact}%"></div>`])
            );

            const maxCount = Math.max(...d.charts.error_histogram.map(b => b.count), 1);
            document.getElementById('errors').innerHTML = table(
                ['Range', 'Count', ''],
                d.charts.error_histogram.map(b => [`${fmt(b.start, 2)} to ${fmt(b.end, 2)}`, b.count,
                    `<div class="bar" style="width: ${100 * b.count / maxCount}%"></div>`])
            );

            document.getElementById('predictions').innerHTML = table(
                ['Student', 'Actual', 'Predicted', 'Difference', 'Status', 'Advice'],
                d.predictions.map(p => [p.student, fmt(p.actual, 2), fmt(p.predicted, 2), fmt(p.difference, 2),
                    `<span class="${p.status === 'On Track' ? 'on-track' : 'attention'}">${p.status}</span>`,
                    `<strong>${p.advice.headline}</strong><br>` +
                    p.advice.recommendations.concat(p.advice.notes).join('<br>')])
            );

            const summaries = [['Course', d.course_summary], ['Semester', d.semester_summary]]
                .filter(([, rows]) => rows)
                .map(([label, rows]) => `<h3>📚 ${label} Analysis</h3>` + table(
                    [label, 'Students', 'Avg Hours', 'Avg CA', 'Avg Exam', 'Avg Grade'],
                    rows.map(r => [r.group, r.students, r.avg_hours_studied, r.avg_ca_score, r.avg_exam_score, r.avg_final_grade])
                )).join('');
            document.getElementById('summaries').style.display = summaries ? 'block' : 'none';
            document.getElementById('summaries').innerHTML = summaries;

            document.getElementById('log-header').innerHTML = `<p>${d.log_header.generated} | ${d.log_header.user} |
                R² = ${fmt(d.log_header.r2, 4)}, MSE = ${fmt(d.log_header.mse, 4)}</p>`;
            document.getElementById('log').textContent = d.log;
        }

        async function download(url, fallbackName) {
            const response = await fetch(url, { method: 'POST', body: await uploadBody() });
            if (!response.ok) { showError(await response.json()); return; }
            const disposition = response.headers.get('Content-Disposition') || '';
            const match = disposition.match(/filename="?([^"]+)"?/);
            const link = document.createElement('a');
            link.href = URL.createObjectURL(await response.blob());
            link.download = match ? match[1] : fallbackName;
            link.click();
        }

        async function saveRecords() {
            const response = await fetch('/api/records', { method: 'POST', body: await uploadBody() });
            const data = await response.json();
            if (!response.ok) { showError(data); return; }
            document.getElementById('status').innerHTML = `<p>💾 Saved ${data.saved} records</p>`;
        }

        async function logout() {
            await fetch('/api/logout', { method: 'POST' });
            window.location.href = '/';
        }

        (async function init() {
            const response = await fetch('/api/me');
            if (!response.ok) { window.location.href = '/'; return; }
            const user = await response.json();
            document.getElementById('welcome').textContent = `Welcome, ${user.full_name || user.username}!`;
            runPipeline();
        })();
    </script>
</body>
</html>
"#;
